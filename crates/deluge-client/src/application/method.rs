//! Dotted method names built one segment at a time.
//!
//! Daemon methods live in namespaces (`core`, `daemon`, `label`, ...), so a
//! call reads naturally as a path:
//!
//! ```no_run
//! # use deluge_client::{ClientOptions, DelugeClient, Kwargs};
//! # let mut client = DelugeClient::new(ClientOptions::default());
//! let ids = client.method("core").attr("get_torrents").invoke(vec![], Kwargs::new())?;
//! # Ok::<(), deluge_client::DelugeError>(())
//! ```
//!
//! is the same call as `client.call("core.get_torrents", vec![], Kwargs::new())`.

use deluge_core::{Kwargs, Value};

use super::client::DelugeClient;
use super::error::DelugeError;
use crate::infrastructure::transport::Connector;

/// A method name under construction, bound to the client that will call it.
pub struct MethodPath<'a, C: Connector> {
    client: &'a mut DelugeClient<C>,
    path: String,
}

impl<'a, C: Connector> MethodPath<'a, C> {
    pub(crate) fn new(client: &'a mut DelugeClient<C>, name: &str) -> Self {
        Self {
            client,
            path: name.to_string(),
        }
    }

    /// Appends `.name` to the path.
    pub fn attr(mut self, name: &str) -> Self {
        if !self.path.is_empty() {
            self.path.push('.');
        }
        self.path.push_str(name);
        self
    }

    /// The dotted name built so far.
    pub fn name(&self) -> &str {
        &self.path
    }

    /// Calls the method.  Same semantics as [`DelugeClient::call`].
    ///
    /// # Errors
    ///
    /// Whatever [`DelugeClient::call`] returns.
    pub fn invoke(self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, DelugeError> {
        self.client.call(&self.path, args, kwargs)
    }
}

#[cfg(test)]
mod tests {
    use crate::application::client::{ClientOptions, DelugeClient};
    use crate::infrastructure::transport::mock::ScriptedConnector;

    #[test]
    fn test_attr_joins_with_dots() {
        let mut client =
            DelugeClient::with_connector(ClientOptions::default(), ScriptedConnector::new());

        let path = client.method("core").attr("get_torrents_status");

        assert_eq!(path.name(), "core.get_torrents_status");
    }

    #[test]
    fn test_empty_root_has_no_leading_dot() {
        let mut client =
            DelugeClient::with_connector(ClientOptions::default(), ScriptedConnector::new());

        let path = client.method("").attr("label").attr("get_labels");

        assert_eq!(path.name(), "label.get_labels");
    }
}
