pub mod client;
pub mod executor;

pub use client::{HttpClient, HttpClientBuilder};
pub use executor::{execute, ExecutionOutcome};
