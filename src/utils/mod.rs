pub mod http;
pub mod language;
pub mod locale;
pub mod logging;
pub mod telegram;
pub mod timing;
