mod client;
mod server;

pub use client::HttpCardApi;
pub use server::{Endpoint, SERVER_HTTP_URL};
