pub mod certificate;
pub mod error;
pub mod ledger;
pub mod request;
pub mod service;
pub mod share;
pub mod status;
pub mod template;
pub mod timestamp;
pub mod utils;
pub mod verification;
