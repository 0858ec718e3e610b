use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use uuid::Uuid;

use crate::document::Attachment;
use crate::templates::Rendered;

const LINE_WIDTH: usize = 76;

/// Builds a raw RFC 5322 message: `multipart/mixed` holding a
/// `multipart/alternative` text/html body and one base64 attachment.
pub fn build_mixed(
    from: &str,
    to: &[String],
    rendered: &Rendered,
    attachment: &Attachment,
    boundary_seed: Uuid,
) -> Vec<u8> {
    let mixed = format!("mixed-{}", boundary_seed.simple());
    let alternative = format!("alt-{}", boundary_seed.simple());
    let mut out = String::new();

    push_line(&mut out, &format!("From: {}", from));
    push_line(&mut out, &format!("To: {}", to.join(", ")));
    push_line(&mut out, &format!("Subject: {}", encode_header(&rendered.subject)));
    push_line(&mut out, "MIME-Version: 1.0");
    push_line(
        &mut out,
        &format!("Content-Type: multipart/mixed; boundary=\"{}\"", mixed),
    );
    push_line(&mut out, "");

    push_line(&mut out, &format!("--{}", mixed));
    push_line(
        &mut out,
        &format!("Content-Type: multipart/alternative; boundary=\"{}\"", alternative),
    );
    push_line(&mut out, "");
    push_part(&mut out, &alternative, "text/plain; charset=utf-8", None, rendered.text.as_bytes());
    push_part(&mut out, &alternative, "text/html; charset=utf-8", None, rendered.html.as_bytes());
    push_line(&mut out, &format!("--{}--", alternative));
    push_line(&mut out, "");

    push_part(
        &mut out,
        &mixed,
        attachment.content_type,
        Some(&attachment.filename),
        &attachment.data,
    );
    push_line(&mut out, &format!("--{}--", mixed));

    out.into_bytes()
}

/// RFC 2047 encoded-word for non-ASCII header values.
pub fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value))
    }
}

fn push_part(
    out: &mut String,
    boundary: &str,
    content_type: &str,
    filename: Option<&str>,
    data: &[u8],
) {
    push_line(out, &format!("--{}", boundary));
    push_line(out, &format!("Content-Type: {}", content_type));
    push_line(out, "Content-Transfer-Encoding: base64");
    if let Some(filename) = filename {
        push_line(
            out,
            &format!("Content-Disposition: attachment; filename=\"{}\"", filename),
        );
    }
    push_line(out, "");

    let encoded = STANDARD.encode(data);
    // base64 output is ASCII, so byte offsets are char boundaries
    for start in (0..encoded.len()).step_by(LINE_WIDTH) {
        let end = (start + LINE_WIDTH).min(encoded.len());
        push_line(out, &encoded[start..end]);
    }
    push_line(out, "");
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push_str("\r\n");
}
