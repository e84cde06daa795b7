pub mod client_config;
pub mod compress;
pub mod dump;
pub mod lock;
pub mod logging;
pub mod redacted;
pub mod result_error;
pub mod run;
pub mod scalar;
pub mod tree;
pub mod validate;
