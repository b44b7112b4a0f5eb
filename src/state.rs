use crate::{
    config::Config,
    services::{
        AdminService, ConversationService, MessageService, PresenceService, ProfileService,
    },
    store::ChatStore,
    websocket::{broadcast::BroadcastRouter, ConnectionRegistry},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub registry: ConnectionRegistry,
    pub router: BroadcastRouter,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub presence: PresenceService,
    pub admin: AdminService,
    pub profiles: ProfileService,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire every service over one store and one registry.
    pub fn new(store: Arc<dyn ChatStore>, router: BroadcastRouter, config: Arc<Config>) -> Self {
        let registry = router.registry().clone();
        let conversations = ConversationService::new(store.clone());
        let messages = MessageService::new(store.clone(), conversations.clone(), router.clone());
        let presence = PresenceService::new(
            store.clone(),
            router.clone(),
            config.presence.activity_window,
        );
        let admin = AdminService::new(
            store.clone(),
            conversations.clone(),
            messages.clone(),
            presence.clone(),
        );
        let profiles = ProfileService::new(store.clone());

        Self {
            store,
            registry,
            router,
            conversations,
            messages,
            presence,
            admin,
            profiles,
            config,
        }
    }
}
