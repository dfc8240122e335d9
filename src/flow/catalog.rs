// SPDX-License-Identifier: MIT

use crate::agents::{Agent, FlowError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Shared catalog of agent definitions, keyed by agent id
#[derive(Debug, Clone)]
pub struct AgentCatalog {
    agents: Arc<RwLock<HashMap<String, Agent>>>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert an agent under its own id, replacing any previous entry
    pub async fn register(&self, agent: Agent) -> Option<Agent> {
        let mut agents = self.agents.write().await;
        agents.insert(agent.id.clone(), agent)
    }

    /// Store a new agent under a freshly generated id and return that id
    pub async fn create(&self, mut draft: Agent) -> String {
        draft.id = Uuid::new_v4().to_string();
        let id = draft.id.clone();
        log::info!("Created agent {} ({})", draft.name, id);
        self.register(draft).await;
        id
    }

    /// Replace an existing agent
    pub async fn update(&self, agent: Agent) -> Result<(), FlowError> {
        let mut agents = self.agents.write().await;
        match agents.get_mut(&agent.id) {
            Some(existing) => {
                *existing = agent;
                Ok(())
            }
            None => Err(FlowError::agent_not_found(agent.id)),
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Agent> {
        let mut agents = self.agents.write().await;
        agents.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<Agent> {
        let agents = self.agents.read().await;
        agents.get(id).cloned()
    }

    /// List agents, optionally restricted to one kind code, sorted by name
    pub async fn list(&self, kind: Option<u8>) -> Vec<Agent> {
        let agents = self.agents.read().await;
        let mut listed: Vec<Agent> = agents
            .values()
            .filter(|a| kind.map_or(true, |k| a.kind.code() == k))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        listed
    }

    /// Point-in-time copy for use during a run
    pub async fn snapshot(&self) -> HashMap<String, Agent> {
        self.agents.read().await.clone()
    }
}

impl Default for AgentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;

    fn handler(id: &str, name: &str) -> Agent {
        Agent::new(id, name, AgentKind::Handler { deal: String::new() })
    }

    fn painter(id: &str, name: &str) -> Agent {
        Agent::new(
            id,
            name,
            AgentKind::Painter {
                identity_setting: String::new(),
                style: "ink".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_register_and_get_agent() {
        let catalog = AgentCatalog::new();
        catalog.register(handler("h1", "Shell")).await;

        let retrieved = catalog.get("h1").await;
        assert_eq!(retrieved.unwrap().name, "Shell");
        assert!(catalog.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_id() {
        let catalog = AgentCatalog::new();
        let first = catalog.create(handler("", "One")).await;
        let second = catalog.create(handler("", "Two")).await;

        assert_ne!(first, second);
        assert_eq!(catalog.get(&first).await.unwrap().name, "One");
        assert_eq!(catalog.get(&second).await.unwrap().id, second);
    }

    #[tokio::test]
    async fn test_update_requires_existing_agent() {
        let catalog = AgentCatalog::new();
        catalog.register(handler("h1", "Old")).await;

        catalog.update(handler("h1", "New")).await.unwrap();
        assert_eq!(catalog.get("h1").await.unwrap().name, "New");

        let err = catalog.update(handler("h2", "Nope")).await.unwrap_err();
        assert!(matches!(err, FlowError::AgentNotFound { id } if id == "h2"));
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_and_sorts() {
        let catalog = AgentCatalog::new();
        catalog.register(handler("h2", "Zeta")).await;
        catalog.register(painter("p1", "Brush")).await;
        catalog.register(handler("h1", "Alpha")).await;

        let all: Vec<String> = catalog.list(None).await.into_iter().map(|a| a.name).collect();
        assert_eq!(all, vec!["Alpha", "Brush", "Zeta"]);

        let handlers = catalog.list(Some(AgentKind::HANDLER)).await;
        assert_eq!(handlers.len(), 2);
        assert!(catalog.list(Some(AgentKind::JUDGE)).await.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_is_shared_between_clones() {
        let catalog = AgentCatalog::new();
        let cloned = catalog.clone();

        cloned.register(handler("h1", "Shared")).await;
        assert!(catalog.get("h1").await.is_some());

        catalog.remove("h1").await;
        assert!(cloned.get("h1").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let catalog = AgentCatalog::new();
        catalog.register(handler("h1", "Before")).await;

        let snapshot = catalog.snapshot().await;
        catalog.update(handler("h1", "After")).await.unwrap();

        assert_eq!(snapshot["h1"].name, "Before");
    }
}
