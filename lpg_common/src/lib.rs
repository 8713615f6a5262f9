mod cents;
mod litoshi;

pub mod op;
mod secret;

pub use cents::Cents;
pub use litoshi::{Litoshi, LitoshiConversionError, LITOSHI_PER_LTC, LTC_CURRENCY_CODE, LTC_CURRENCY_CODE_LOWER};
pub use secret::Secret;
