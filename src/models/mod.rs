/// Declares a closed status set whose storage spelling is the same string
/// used on the wire, with `as_str`/`FromStr` for explicit conversion.
macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $repr:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $repr)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $repr,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::AppError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                match raw {
                    $($repr => Ok($name::$variant),)+
                    other => Err(crate::error::AppError::BadRequest(format!(
                        "unknown {} value: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

pub(crate) use status_enum;

pub mod bid;
pub mod dispute;
pub mod earnings;
pub mod event;
pub mod payment;
pub mod request;
pub mod review;
pub mod route;
pub mod tracking;
pub mod withdrawal;

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::bid::BidStatus;
    use super::payment::PaymentStatus;
    use super::tracking::DeliveryStatus;

    #[test]
    fn storage_spelling_matches_wire_spelling() {
        for status in PaymentStatus::ALL {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, serde_json::Value::String(status.as_str().to_string()));
            assert_eq!(PaymentStatus::from_str(status.as_str()).unwrap(), *status);
        }
        assert_eq!(DeliveryStatus::PickedUp.as_str(), "picked_up");
        assert_eq!(PaymentStatus::Completed.as_str(), "completed");
    }

    #[test]
    fn unknown_spelling_is_rejected() {
        assert!(BidStatus::from_str("accepted").is_err());
        assert!(BidStatus::from_str("ACCEPTED").is_ok());
    }
}
