//! Builds the backends every command needs from the command-line settings.

use anyhow::Result;
use log::debug;
use reqwest::Client;

use crate::backend::{Conda, DEFAULT_INDEX_URL, Pip};
use crate::http::HttpClient;
use crate::runtime::Runtime;

const USER_AGENT: &str = concat!("seamm-installer/", env!("SEAMM_INSTALLER_VERSION"));

/// HTTP client for the package index.
pub fn build_http_client() -> Result<HttpClient> {
    let client = Client::builder().user_agent(USER_AGENT).build()?;
    Ok(HttpClient::new(client))
}

/// The conda and pip backends.
pub struct Backends<'a, R: Runtime> {
    pub conda: Conda<'a, R>,
    pub pip: Pip<'a, R>,
}

impl<'a, R: Runtime> Backends<'a, R> {
    pub fn new(runtime: &'a R, index_url: Option<&str>) -> Result<Self> {
        let index_url = index_url.unwrap_or(DEFAULT_INDEX_URL);
        debug!("Using the package index at {}", index_url);
        Ok(Self {
            conda: Conda::new(runtime),
            pip: Pip::new(runtime, build_http_client()?, index_url),
        })
    }
}
