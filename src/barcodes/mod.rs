pub mod services;

pub use services::BarcodeIssuer;
