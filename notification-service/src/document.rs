use shared::NotificationJob;

use crate::templates::Rendered;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// Plain-text document for jobs that ask for an attachment: the rendered
/// subject as a heading, then every variable in key order.
pub fn generate(job: &NotificationJob, rendered: &Rendered) -> Attachment {
    let reference = job
        .variables
        .get("reference")
        .map(|value| sanitize(value))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "document".to_string());

    let mut body = String::new();
    body.push_str(&rendered.subject);
    body.push('\n');
    body.push_str(&"=".repeat(rendered.subject.chars().count()));
    body.push_str("\n\n");

    for (key, value) in &job.variables {
        let mut lines = value.lines();
        body.push_str(key);
        body.push_str(": ");
        body.push_str(lines.next().unwrap_or_default());
        body.push('\n');
        for line in lines {
            body.push_str("    ");
            body.push_str(line);
            body.push('\n');
        }
    }

    Attachment {
        filename: format!("{}-{}.txt", sanitize(&job.template), reference),
        content_type: "text/plain; charset=utf-8",
        data: body.into_bytes(),
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::templates;

    fn rendered(subject: &str) -> Rendered {
        Rendered {
            subject: subject.to_string(),
            text: String::new(),
            html: String::new(),
        }
    }

    #[test]
    fn document_lists_variables_in_key_order() {
        let job = NotificationJob::new(templates::BILL_READY, "guest@example.com")
            .with_var("total", "33.00")
            .with_var("items", "Pasta x2 = 29.00\nWater x2 = 4.00")
            .with_var("reference", "b-42");

        let doc = generate(&job, &rendered("Your bill"));
        let text = String::from_utf8(doc.data).unwrap();

        assert_eq!(doc.filename, "bill_ready-b-42.txt");
        assert_eq!(
            text,
            "Your bill\n=========\n\n\
             items: Pasta x2 = 29.00\n    Water x2 = 4.00\n\
             reference: b-42\n\
             total: 33.00\n"
        );
    }

    #[test]
    fn filename_falls_back_without_reference() {
        let job = NotificationJob::new(templates::PAYMENT_RECEIPT, "guest@example.com")
            .with_var("reference", "../../etc");
        assert_eq!(generate(&job, &rendered("r")).filename, "payment_receipt-etc.txt");

        let job = NotificationJob::new(templates::PAYMENT_RECEIPT, "guest@example.com");
        assert_eq!(generate(&job, &rendered("r")).filename, "payment_receipt-document.txt");
    }
}
