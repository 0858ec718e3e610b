use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub kind: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

/// Declares a closed status enum stored as `VARCHAR`, together with the set of
/// transitions the engine is allowed to perform on it. States with no entry
/// in `transitions` are terminal.
macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) { $($variant:ident),+ $(,)? }
        transitions { $($from:ident => [$($to:ident),+]),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
        )]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),+
                }
            }

            pub fn can_transition_to(self, next: Self) -> bool {
                match self {
                    $(Self::$from => matches!(next, $(Self::$to)|+),)*
                    #[allow(unreachable_patterns)]
                    _ => false,
                }
            }

            pub fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
                if self.can_transition_to(next) {
                    Ok(next)
                } else {
                    Err(InvalidTransition {
                        kind: $kind,
                        from: self.as_str(),
                        to: next.as_str(),
                    })
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(Self::$variant),)+
                    other => Err(UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                Ok(raw.parse::<Self>()?)
            }
        }
    };
}

status_enum! {
    /// Lifecycle of a guest booking.
    ReservationStatus("reservation") { Booked, Seated, Completed, Cancelled }
    transitions {
        Booked => [Seated, Cancelled],
        Seated => [Completed],
    }
}

status_enum! {
    /// Occupancy of a physical table. Tables cycle back to `Available` when a
    /// visit is settled.
    TableStatus("table") { Available, Occupied, Reserved }
    transitions {
        Available => [Occupied, Reserved],
        Reserved => [Occupied, Available],
        Occupied => [Available],
    }
}

status_enum! {
    /// `Finalized -> Paid` is the settlement edge: generating a bill leaves the
    /// order `Finalized` and the unpaid bill row records that it was billed.
    OrderStatus("order") { Open, Finalized, Billed, Paid }
    transitions {
        Open => [Finalized],
        Finalized => [Billed, Paid],
        Billed => [Paid],
    }
}

status_enum! {
    BillStatus("bill") { Unpaid, Paid }
    transitions {
        Unpaid => [Paid],
    }
}

status_enum! {
    /// Payments are written once, already terminal.
    PaymentStatus("payment") { Completed }
    transitions {}
}

status_enum! {
    MenuItemStatus("menu item") { Available, Unavailable }
    transitions {
        Available => [Unavailable],
        Unavailable => [Available],
    }
}

status_enum! {
    /// Audit state of one delivery attempt chain.
    NotificationStatus("notification") { Pending, Sent, Failed }
    transitions {
        Pending => [Sent, Failed],
    }
}
