use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the string representation of this identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of an installment purchase.
    ///
    /// ```
    /// use early_payment_engine::core::ids::TransactionId;
    ///
    /// let id = TransactionId::new("TXN-1001");
    /// assert_eq!(id.as_str(), "TXN-1001");
    /// ```
    TransactionId
);

string_id!(
    /// Identifier of one scheduled installment within a transaction.
    InstallmentId
);

string_id!(
    /// Identifier of the merchant whose discount and fee rules apply.
    MerchantId
);

string_id!(
    /// Opaque reference to a tokenised payment method held by the gateway.
    PaymentMethodRef
);

string_id!(
    /// Stable identifier of a discount tier within a merchant's schedule.
    TierId
);
