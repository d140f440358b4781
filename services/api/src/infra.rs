use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use techdesk::config::HelpdeskConfig;
use techdesk::error::AppError;
use techdesk::identity::IdentityService;
use techdesk::notifications::{
    Dispatcher, LogChannel, MailRelayChannel, TemplateCatalog, WebhookChannel,
};
use techdesk::seed::{seed_demo_tickets, seed_demo_users, seed_reference_data, SeedCatalog};
use techdesk::store::InMemoryStore;
use techdesk::tickets::{HelpdeskState, TicketService};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Helpdesk = HelpdeskState<InMemoryStore, Dispatcher>;

/// Seeded in-memory helpdesk shared by the server and the offline commands.
pub(crate) struct SeededHelpdesk {
    pub(crate) state: Arc<Helpdesk>,
    pub(crate) catalog: SeedCatalog,
    pub(crate) tickets_seeded: usize,
}

/// Channels follow configuration: an e-mail relay and a chat webhook when their URLs
/// are set, otherwise notifications only reach the log.
pub(crate) fn build_notifier(config: &HelpdeskConfig) -> Result<Dispatcher, AppError> {
    let mut dispatcher = Dispatcher::new(TemplateCatalog::standard());
    if let Some(url) = &config.mail_relay_url {
        dispatcher = dispatcher.with_channel(MailRelayChannel::new(
            url.as_str(),
            config.mail_from.as_str(),
            config.notify_timeout,
        )?);
    }
    if let Some(url) = &config.webhook_url {
        dispatcher =
            dispatcher.with_channel(WebhookChannel::new(url.as_str(), config.notify_timeout)?);
    }
    if dispatcher.channel_names().is_empty() {
        dispatcher = dispatcher.with_channel(LogChannel);
    }
    info!(channels = ?dispatcher.channel_names(), "notification channels configured");
    Ok(dispatcher)
}

pub(crate) fn seeded_helpdesk(
    config: &HelpdeskConfig,
    with_tickets: bool,
) -> Result<SeededHelpdesk, AppError> {
    let store = Arc::new(InMemoryStore::new());
    let mut catalog = seed_reference_data(store.as_ref())?;
    let identity = Arc::new(IdentityService::new(store.clone()));
    seed_demo_users(&identity, &mut catalog)?;

    let tickets = Arc::new(TicketService::new(
        store,
        Arc::new(build_notifier(config)?),
        config.service_config(),
    ));
    let tickets_seeded = if with_tickets {
        seed_demo_tickets(&tickets, &identity, &catalog)?
    } else {
        0
    };

    Ok(SeededHelpdesk {
        state: Arc::new(HelpdeskState::new(tickets, identity)),
        catalog,
        tickets_seeded,
    })
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
