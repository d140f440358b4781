use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::directory::DirectoryRepository;
use crate::identity::{Identity, IdentityService, User, UserRepository};
use crate::ids::{CategoryId, CentreId, SubCategoryId, TicketId, UserId};
use crate::notifications::{
    Dispatcher, NotificationChannel, NotificationError, NotificationEvent, NotificationSender,
    TemplateCatalog, TicketNotice,
};
use crate::seed::{seed_reference_data, SeedCatalog, DEMO_ACCOUNTS};
use crate::store::{InMemoryStore, StoreError};
use crate::taxonomy::{Category, SubCategory, TaxonomyRepository};
use crate::tickets::{
    helpdesk_router, HelpdeskState, NewTicketRequest, Priority, Ticket, TicketDraft,
    TicketNumber, TicketRepository, TicketService, TicketServiceConfig,
};

/// Seeded store plus every demo account, inserted without password hashes.
pub(super) struct World {
    pub(super) store: Arc<InMemoryStore>,
    pub(super) catalog: SeedCatalog,
    pub(super) identity: Arc<IdentityService<InMemoryStore>>,
}

impl World {
    pub(super) fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = seed_reference_data(store.as_ref()).expect("reference data seeds");

        for account in DEMO_ACCOUNTS {
            let user = User {
                id: UserId::new(),
                username: account.username.to_string(),
                email: Some(format!("{}@example.org", account.username)),
                role: account.role,
                country: account.country.map(|code| catalog.country(code).expect("country")),
                region: account.region.map(|name| catalog.region(name).expect("region")),
                centres: account
                    .centres
                    .iter()
                    .map(|name| catalog.centre(name).expect("centre"))
                    .collect(),
                password_hash: String::new(),
                created_at: Utc::now(),
            };
            let stored = store.insert_user(user).expect("user inserts");
            catalog.users.insert(stored.username.clone(), stored.id);
        }

        let identity = Arc::new(IdentityService::new(store.clone()));
        Self {
            store,
            catalog,
            identity,
        }
    }

    pub(super) fn identity(&self, username: &str) -> Identity {
        let id = self.catalog.user(username).expect("known user");
        self.identity.identity_for(id).expect("identity resolves")
    }

    pub(super) fn centre(&self, name: &str) -> CentreId {
        self.catalog.centre(name).expect("known centre")
    }

    pub(super) fn category(&self, name: &str) -> CategoryId {
        self.catalog.category(name).expect("known category")
    }

    pub(super) fn subcategory(&self, name: &str) -> SubCategoryId {
        self.catalog.subcategory(name).expect("known subcategory")
    }

    pub(super) fn user_id(&self, username: &str) -> UserId {
        self.catalog.user(username).expect("known user")
    }

    pub(super) fn request(&self, centre: &str, description: &str) -> NewTicketRequest {
        NewTicketRequest {
            centre: Some(self.centre(centre)),
            category: Some(self.category("Hardware")),
            subcategory: Some(self.subcategory("Tablet Issues")),
            title: None,
            description: description.to_string(),
            priority: Some(Priority::Medium),
        }
    }

    /// Inserts a ticket straight into the store with a chosen submission time.
    pub(super) fn insert_ticket_at(
        &self,
        submitter: &str,
        centre: &str,
        submitted_at: DateTime<Utc>,
    ) -> Ticket {
        let draft = TicketDraft {
            centre: self.centre(centre),
            category: self.category("Hardware"),
            category_code: "HWE".to_string(),
            subcategory: self.subcategory("Tablet Issues"),
            subcategory_code: "TAB".to_string(),
            title: None,
            description: format!("Filed at {centre}"),
            priority: Priority::Medium,
        };
        let submitted_by = self.user_id(submitter);
        self.store
            .insert_numbered(&mut |number| Ticket::open(number, &draft, submitted_by, submitted_at))
            .expect("ticket inserts")
    }

    pub(super) fn service(
        &self,
        config: TicketServiceConfig,
    ) -> (
        TicketService<InMemoryStore, RecordingNotifier>,
        Arc<RecordingNotifier>,
    ) {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = TicketService::new(self.store.clone(), notifier.clone(), config);
        (service, notifier)
    }

    pub(super) fn router(&self) -> axum::Router {
        let (service, _) = self.service(TicketServiceConfig::default());
        helpdesk_router(Arc::new(HelpdeskState::new(
            Arc::new(service),
            self.identity.clone(),
        )))
    }

    pub(super) fn token(&self, username: &str) -> String {
        self.identity.open_session(self.identity(username)).token
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    notices: Mutex<Vec<TicketNotice>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<NotificationEvent> {
        self.notices
            .lock()
            .expect("notice mutex poisoned")
            .iter()
            .map(|notice| notice.event)
            .collect()
    }

    pub(super) fn notices(&self) -> Vec<TicketNotice> {
        self.notices.lock().expect("notice mutex poisoned").clone()
    }
}

impl NotificationSender for RecordingNotifier {
    fn notify(&self, notice: &TicketNotice) -> Result<(), NotificationError> {
        self.notices
            .lock()
            .expect("notice mutex poisoned")
            .push(notice.clone());
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationSender for FailingNotifier {
    fn notify(&self, _notice: &TicketNotice) -> Result<(), NotificationError> {
        Err(NotificationError::Rejected(502))
    }
}

/// Channel that records `(channel name, event)` for every delivery.
pub(super) struct RecordingChannel {
    pub(super) name: &'static str,
    pub(super) log: Arc<Mutex<Vec<(&'static str, NotificationEvent)>>>,
}

impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    fn deliver(
        &self,
        notice: &TicketNotice,
        catalog: &TemplateCatalog,
    ) -> Result<(), NotificationError> {
        assert!(catalog.webhook_text(notice).is_some());
        self.log
            .lock()
            .expect("channel mutex poisoned")
            .push((self.name, notice.event));
        Ok(())
    }
}

pub(super) fn two_channel_dispatcher() -> (
    Dispatcher,
    Arc<Mutex<Vec<(&'static str, NotificationEvent)>>>,
) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = Dispatcher::new(TemplateCatalog::standard())
        .with_channel(RecordingChannel {
            name: "email",
            log: log.clone(),
        })
        .with_channel(RecordingChannel {
            name: "webhook",
            log: log.clone(),
        });
    (dispatcher, log)
}

type InterleavedWrite = Box<dyn FnOnce(&InMemoryStore) + Send>;

/// Wraps the in-memory store and reports `NumberTaken` for the first `collisions`
/// inserts, like a store that allocates numbers optimistically. Queued interleaved
/// writes run against the inner store just before each ticket update, standing in
/// for another request that committed between the service's read and its write.
pub(super) struct CollidingStore {
    inner: InMemoryStore,
    collisions: Mutex<u32>,
    interleaved: Mutex<Vec<InterleavedWrite>>,
}

impl CollidingStore {
    pub(super) fn new(inner: InMemoryStore, collisions: u32) -> Self {
        Self {
            inner,
            collisions: Mutex::new(collisions),
            interleaved: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn with_interleaved_write(
        self,
        write: impl FnOnce(&InMemoryStore) + Send + 'static,
    ) -> Self {
        self.interleaved
            .lock()
            .expect("interleave mutex poisoned")
            .push(Box::new(write));
        self
    }
}

impl DirectoryRepository for CollidingStore {
    fn insert_country(
        &self,
        country: crate::directory::Country,
    ) -> Result<crate::directory::Country, StoreError> {
        self.inner.insert_country(country)
    }

    fn insert_region(
        &self,
        region: crate::directory::Region,
    ) -> Result<crate::directory::Region, StoreError> {
        self.inner.insert_region(region)
    }

    fn insert_centre(
        &self,
        centre: crate::directory::Centre,
    ) -> Result<crate::directory::Centre, StoreError> {
        self.inner.insert_centre(centre)
    }

    fn update_country(
        &self,
        country: crate::directory::Country,
    ) -> Result<crate::directory::Country, StoreError> {
        self.inner.update_country(country)
    }

    fn update_region(
        &self,
        region: crate::directory::Region,
    ) -> Result<crate::directory::Region, StoreError> {
        self.inner.update_region(region)
    }

    fn update_centre(
        &self,
        centre: crate::directory::Centre,
    ) -> Result<crate::directory::Centre, StoreError> {
        self.inner.update_centre(centre)
    }

    fn country(
        &self,
        id: crate::ids::CountryId,
    ) -> Result<Option<crate::directory::Country>, StoreError> {
        self.inner.country(id)
    }

    fn region(
        &self,
        id: crate::ids::RegionId,
    ) -> Result<Option<crate::directory::Region>, StoreError> {
        self.inner.region(id)
    }

    fn centre(&self, id: CentreId) -> Result<Option<crate::directory::Centre>, StoreError> {
        self.inner.centre(id)
    }

    fn countries(&self) -> Result<Vec<crate::directory::Country>, StoreError> {
        self.inner.countries()
    }

    fn regions(&self) -> Result<Vec<crate::directory::Region>, StoreError> {
        self.inner.regions()
    }

    fn centres(&self) -> Result<Vec<crate::directory::Centre>, StoreError> {
        self.inner.centres()
    }

    fn delete_country(&self, id: crate::ids::CountryId) -> Result<(), StoreError> {
        self.inner.delete_country(id)
    }

    fn delete_region(&self, id: crate::ids::RegionId) -> Result<(), StoreError> {
        self.inner.delete_region(id)
    }

    fn delete_centre(&self, id: CentreId) -> Result<(), StoreError> {
        self.inner.delete_centre(id)
    }
}

impl TaxonomyRepository for CollidingStore {
    fn insert_category(&self, category: Category) -> Result<Category, StoreError> {
        self.inner.insert_category(category)
    }

    fn insert_subcategory(&self, subcategory: SubCategory) -> Result<SubCategory, StoreError> {
        self.inner.insert_subcategory(subcategory)
    }

    fn update_category(&self, category: Category) -> Result<Category, StoreError> {
        self.inner.update_category(category)
    }

    fn update_subcategory(&self, subcategory: SubCategory) -> Result<SubCategory, StoreError> {
        self.inner.update_subcategory(subcategory)
    }

    fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        self.inner.category(id)
    }

    fn subcategory(&self, id: SubCategoryId) -> Result<Option<SubCategory>, StoreError> {
        self.inner.subcategory(id)
    }

    fn categories(&self) -> Result<Vec<Category>, StoreError> {
        self.inner.categories()
    }

    fn subcategories(&self) -> Result<Vec<SubCategory>, StoreError> {
        self.inner.subcategories()
    }

    fn subcategories_of(&self, category: CategoryId) -> Result<Vec<SubCategory>, StoreError> {
        self.inner.subcategories_of(category)
    }

    fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        self.inner.delete_category(id)
    }

    fn delete_subcategory(&self, id: SubCategoryId) -> Result<(), StoreError> {
        self.inner.delete_subcategory(id)
    }
}

impl UserRepository for CollidingStore {
    fn insert_user(&self, user: User) -> Result<User, StoreError> {
        self.inner.insert_user(user)
    }

    fn update_user(&self, user: User) -> Result<User, StoreError> {
        self.inner.update_user(user)
    }

    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.user(id)
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.inner.user_by_username(username)
    }

    fn users(&self) -> Result<Vec<User>, StoreError> {
        self.inner.users()
    }
}

impl TicketRepository for CollidingStore {
    fn insert_numbered(
        &self,
        build: &mut dyn FnMut(TicketNumber) -> Ticket,
    ) -> Result<Ticket, StoreError> {
        let mut remaining = self.collisions.lock().expect("collision mutex poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            return Err(StoreError::NumberTaken(TicketNumber::FIRST));
        }
        drop(remaining);
        self.inner.insert_numbered(build)
    }

    fn update_ticket(&self, ticket: Ticket) -> Result<Ticket, StoreError> {
        let next = {
            let mut queued = self.interleaved.lock().expect("interleave mutex poisoned");
            (!queued.is_empty()).then(|| queued.remove(0))
        };
        if let Some(write) = next {
            write(&self.inner);
        }
        self.inner.update_ticket(ticket)
    }

    fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        self.inner.ticket(id)
    }

    fn ticket_by_number(&self, number: TicketNumber) -> Result<Option<Ticket>, StoreError> {
        self.inner.ticket_by_number(number)
    }

    fn tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        self.inner.tickets()
    }
}

pub(super) fn numbers(tickets: &[Ticket]) -> Vec<u64> {
    tickets.iter().map(|ticket| ticket.number.0).collect()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
