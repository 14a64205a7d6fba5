use std::collections::BTreeMap;

use url::Url;

use crate::models::CacheVersion;

/// An open view of the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Version serving this client, if any.
    pub controller: Option<CacheVersion>,
}

impl Client {
    pub fn new(id: &str, url: Url) -> Self {
        Self {
            id: id.to_string(),
            url,
            controller: None,
        }
    }
}

/// Registry of open clients.
#[derive(Debug, Default)]
pub struct Clients {
    clients: BTreeMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn controlled_by(&self, version: &CacheVersion) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| c.controller.as_ref() == Some(version))
            .collect()
    }

    /// Make `version` the controller of every client. Returns the ids whose
    /// controller changed.
    pub fn claim(&mut self, version: &CacheVersion) -> Vec<String> {
        let mut changed = Vec::new();
        for client in self.clients.values_mut() {
            if client.controller.as_ref() != Some(version) {
                client.controller = Some(version.clone());
                changed.push(client.id.clone());
            }
        }
        changed
    }
}
