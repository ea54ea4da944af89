//! A reusable handle over the blocking exchange engine.
//!
//! # Design
//! `Client` holds the transport seams and default [`RequestOptions`] and
//! carries no other state between calls. Every `send` is an independent
//! exchange on a fresh connection, so one `Client` can be shared across
//! threads when its resolver and connector are `Sync`.

use crate::config::RequestOptions;
use crate::error::Error;
use crate::exchange::exchange_with;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{Connect, Resolve, SystemResolver, TcpConnector};

#[derive(Debug, Clone)]
pub struct Client<R = SystemResolver, C = TcpConnector> {
    resolver: R,
    connector: C,
    options: RequestOptions,
}

impl Client {
    /// A client over the system resolver and plain TCP.
    pub fn new() -> Self {
        Client {
            resolver: SystemResolver,
            connector: TcpConnector::new(),
            options: RequestOptions::default(),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::new()
    }
}

impl<R: Resolve, C: Connect> Client<R, C> {
    pub fn with_transport(resolver: R, connector: C) -> Self {
        Client {
            resolver,
            connector,
            options: RequestOptions::default(),
        }
    }

    /// Replace the options applied to every exchange.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Send `request` to the endpoint named by its own URI.
    pub fn send(&self, request: Request) -> Result<Response, Error> {
        let uri = request.uri().clone();
        exchange_with(&self.resolver, &self.connector, &uri, request, &self.options)
    }

    /// `GET` the given URL.
    pub fn get(&self, url: &str) -> Result<Response, Error> {
        self.send(Request::get(url)?)
    }
}

/// `GET` `url` with default options over plain TCP.
pub fn fetch(url: &str) -> Result<Response, Error> {
    Client::new().get(url)
}
