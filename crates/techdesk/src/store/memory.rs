use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::StoreError;
use crate::directory::{Centre, Country, DirectoryRepository, Region};
use crate::identity::{Role, User, UserRepository};
use crate::ids::{CategoryId, CentreId, CountryId, RegionId, SubCategoryId, TicketId, UserId};
use crate::taxonomy::{Category, SubCategory, TaxonomyRepository};
use crate::tickets::{Ticket, TicketNumber, TicketRepository};

#[derive(Debug, Default)]
struct StoreState {
    countries: HashMap<CountryId, Country>,
    regions: HashMap<RegionId, Region>,
    centres: HashMap<CentreId, Centre>,
    categories: HashMap<CategoryId, Category>,
    subcategories: HashMap<SubCategoryId, SubCategory>,
    users: HashMap<UserId, User>,
    tickets: HashMap<TicketId, Ticket>,
}

impl StoreState {
    fn next_number(&self) -> TicketNumber {
        self.tickets
            .values()
            .map(|ticket| ticket.number)
            .max()
            .map_or(TicketNumber::FIRST, TicketNumber::next)
    }

    fn check_ticket_references(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let missing = |parent| StoreError::MissingParent {
            entity: "ticket",
            parent,
        };

        if !self.centres.contains_key(&ticket.centre) {
            return Err(missing("centre"));
        }
        if !self.categories.contains_key(&ticket.category) {
            return Err(missing("category"));
        }
        match self.subcategories.get(&ticket.subcategory) {
            Some(subcategory) if subcategory.belongs_to(ticket.category) => {}
            Some(_) => return Err(missing("subcategory of the ticket's category")),
            None => return Err(missing("subcategory")),
        }
        if !self.users.contains_key(&ticket.submitted_by) {
            return Err(missing("submitter"));
        }
        for user in [ticket.assigned_to, ticket.resolved_by].into_iter().flatten() {
            if !self.users.contains_key(&user) {
                return Err(missing("user"));
            }
        }
        Ok(())
    }

    /// At most one account may hold the super administrator role.
    fn check_sole_super_admin(&self, user: &User) -> Result<(), StoreError> {
        let taken = user.role == Role::SuperAdmin
            && self
                .users
                .values()
                .any(|existing| existing.id != user.id && existing.role == Role::SuperAdmin);
        if taken {
            Err(StoreError::SoleRoleTaken {
                role: Role::SuperAdmin.label(),
            })
        } else {
            Ok(())
        }
    }

    fn check_user_references(&self, user: &User) -> Result<(), StoreError> {
        let missing = |parent| StoreError::MissingParent {
            entity: "user",
            parent,
        };

        if user.country.is_some_and(|id| !self.countries.contains_key(&id)) {
            return Err(missing("country"));
        }
        if user.region.is_some_and(|id| !self.regions.contains_key(&id)) {
            return Err(missing("region"));
        }
        if user.centres.iter().any(|id| !self.centres.contains_key(id)) {
            return Err(missing("centre"));
        }
        Ok(())
    }
}

fn blocked(entity: &'static str, dependents: &[(&str, usize)]) -> Result<(), StoreError> {
    let named: Vec<String> = dependents
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(kind, count)| format!("{count} {kind}"))
        .collect();
    if named.is_empty() {
        Ok(())
    } else {
        Err(StoreError::ReferentialIntegrity {
            entity,
            dependents: named.join(", "),
        })
    }
}

fn ensure_exists<K, V>(map: &HashMap<K, V>, id: &K, entity: &'static str) -> Result<(), StoreError>
where
    K: std::hash::Hash + Eq,
{
    if map.contains_key(id) {
        Ok(())
    } else {
        Err(StoreError::NotFound { entity })
    }
}

fn sorted_by_name<T: Clone>(values: impl Iterator<Item = T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    let mut collected: Vec<T> = values.collect();
    collected.sort_by(|left, right| name(left).cmp(name(right)));
    collected
}

/// Process-local store implementing every repository contract behind one lock, so
/// "allocate the next number, then insert" can never interleave.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl DirectoryRepository for InMemoryStore {
    fn insert_country(&self, country: Country) -> Result<Country, StoreError> {
        let mut state = self.state()?;
        if state
            .countries
            .values()
            .any(|existing| existing.code == country.code)
        {
            return Err(StoreError::Conflict {
                entity: "country",
                detail: format!("code {}", country.code),
            });
        }
        state.countries.insert(country.id, country.clone());
        Ok(country)
    }

    fn insert_region(&self, region: Region) -> Result<Region, StoreError> {
        let mut state = self.state()?;
        if !state.countries.contains_key(&region.country) {
            return Err(StoreError::MissingParent {
                entity: "region",
                parent: "country",
            });
        }
        state.regions.insert(region.id, region.clone());
        Ok(region)
    }

    fn insert_centre(&self, centre: Centre) -> Result<Centre, StoreError> {
        let mut state = self.state()?;
        if !state.regions.contains_key(&centre.region) {
            return Err(StoreError::MissingParent {
                entity: "centre",
                parent: "region",
            });
        }
        state.centres.insert(centre.id, centre.clone());
        Ok(centre)
    }

    fn update_country(&self, country: Country) -> Result<Country, StoreError> {
        let mut state = self.state()?;
        ensure_exists(&state.countries, &country.id, "country")?;
        if state
            .countries
            .values()
            .any(|existing| existing.id != country.id && existing.code == country.code)
        {
            return Err(StoreError::Conflict {
                entity: "country",
                detail: format!("code {}", country.code),
            });
        }
        state.countries.insert(country.id, country.clone());
        Ok(country)
    }

    fn update_region(&self, region: Region) -> Result<Region, StoreError> {
        let mut state = self.state()?;
        ensure_exists(&state.regions, &region.id, "region")?;
        if !state.countries.contains_key(&region.country) {
            return Err(StoreError::MissingParent {
                entity: "region",
                parent: "country",
            });
        }
        state.regions.insert(region.id, region.clone());
        Ok(region)
    }

    fn update_centre(&self, centre: Centre) -> Result<Centre, StoreError> {
        let mut state = self.state()?;
        ensure_exists(&state.centres, &centre.id, "centre")?;
        if !state.regions.contains_key(&centre.region) {
            return Err(StoreError::MissingParent {
                entity: "centre",
                parent: "region",
            });
        }
        state.centres.insert(centre.id, centre.clone());
        Ok(centre)
    }

    fn country(&self, id: CountryId) -> Result<Option<Country>, StoreError> {
        Ok(self.state()?.countries.get(&id).cloned())
    }

    fn region(&self, id: RegionId) -> Result<Option<Region>, StoreError> {
        Ok(self.state()?.regions.get(&id).cloned())
    }

    fn centre(&self, id: CentreId) -> Result<Option<Centre>, StoreError> {
        Ok(self.state()?.centres.get(&id).cloned())
    }

    fn countries(&self) -> Result<Vec<Country>, StoreError> {
        let state = self.state()?;
        Ok(sorted_by_name(state.countries.values().cloned(), |c| c.name.as_str()))
    }

    fn regions(&self) -> Result<Vec<Region>, StoreError> {
        let state = self.state()?;
        Ok(sorted_by_name(state.regions.values().cloned(), |r| r.name.as_str()))
    }

    fn centres(&self) -> Result<Vec<Centre>, StoreError> {
        let state = self.state()?;
        Ok(sorted_by_name(state.centres.values().cloned(), |c| c.name.as_str()))
    }

    fn delete_country(&self, id: CountryId) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if !state.countries.contains_key(&id) {
            return Err(StoreError::NotFound { entity: "country" });
        }
        let regions = state.regions.values().filter(|r| r.country == id).count();
        let users = state
            .users
            .values()
            .filter(|u| u.country == Some(id))
            .count();
        blocked("country", &[("regions", regions), ("users", users)])?;
        state.countries.remove(&id);
        Ok(())
    }

    fn delete_region(&self, id: RegionId) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if !state.regions.contains_key(&id) {
            return Err(StoreError::NotFound { entity: "region" });
        }
        let centres = state.centres.values().filter(|c| c.region == id).count();
        let users = state
            .users
            .values()
            .filter(|u| u.region == Some(id))
            .count();
        blocked("region", &[("centres", centres), ("users", users)])?;
        state.regions.remove(&id);
        Ok(())
    }

    fn delete_centre(&self, id: CentreId) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if !state.centres.contains_key(&id) {
            return Err(StoreError::NotFound { entity: "centre" });
        }
        let tickets = state.tickets.values().filter(|t| t.centre == id).count();
        let users = state
            .users
            .values()
            .filter(|u| u.centres.contains(&id))
            .count();
        blocked("centre", &[("tickets", tickets), ("users", users)])?;
        state.centres.remove(&id);
        Ok(())
    }
}

impl TaxonomyRepository for InMemoryStore {
    fn insert_category(&self, category: Category) -> Result<Category, StoreError> {
        let mut state = self.state()?;
        if state
            .categories
            .values()
            .any(|existing| existing.code == category.code)
        {
            return Err(StoreError::Conflict {
                entity: "category",
                detail: format!("code {}", category.code),
            });
        }
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    fn insert_subcategory(&self, subcategory: SubCategory) -> Result<SubCategory, StoreError> {
        let mut state = self.state()?;
        if !state.categories.contains_key(&subcategory.category) {
            return Err(StoreError::MissingParent {
                entity: "subcategory",
                parent: "category",
            });
        }
        state.subcategories.insert(subcategory.id, subcategory.clone());
        Ok(subcategory)
    }

    fn update_category(&self, category: Category) -> Result<Category, StoreError> {
        let mut state = self.state()?;
        ensure_exists(&state.categories, &category.id, "category")?;
        if state
            .categories
            .values()
            .any(|existing| existing.id != category.id && existing.code == category.code)
        {
            return Err(StoreError::Conflict {
                entity: "category",
                detail: format!("code {}", category.code),
            });
        }
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    fn update_subcategory(&self, subcategory: SubCategory) -> Result<SubCategory, StoreError> {
        let mut state = self.state()?;
        let current = state
            .subcategories
            .get(&subcategory.id)
            .ok_or(StoreError::NotFound {
                entity: "subcategory",
            })?;
        if !state.categories.contains_key(&subcategory.category) {
            return Err(StoreError::MissingParent {
                entity: "subcategory",
                parent: "category",
            });
        }
        if current.category != subcategory.category {
            let tickets = state
                .tickets
                .values()
                .filter(|t| t.subcategory == subcategory.id)
                .count();
            blocked("subcategory", &[("tickets", tickets)])?;
        }
        state.subcategories.insert(subcategory.id, subcategory.clone());
        Ok(subcategory)
    }

    fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        Ok(self.state()?.categories.get(&id).cloned())
    }

    fn subcategory(&self, id: SubCategoryId) -> Result<Option<SubCategory>, StoreError> {
        Ok(self.state()?.subcategories.get(&id).cloned())
    }

    fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let state = self.state()?;
        Ok(sorted_by_name(state.categories.values().cloned(), |c| c.name.as_str()))
    }

    fn subcategories(&self) -> Result<Vec<SubCategory>, StoreError> {
        let state = self.state()?;
        Ok(sorted_by_name(state.subcategories.values().cloned(), |s| s.name.as_str()))
    }

    fn subcategories_of(&self, category: CategoryId) -> Result<Vec<SubCategory>, StoreError> {
        let state = self.state()?;
        Ok(sorted_by_name(
            state
                .subcategories
                .values()
                .filter(|s| s.belongs_to(category))
                .cloned(),
            |s| s.name.as_str(),
        ))
    }

    fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if !state.categories.contains_key(&id) {
            return Err(StoreError::NotFound { entity: "category" });
        }
        let subcategories = state
            .subcategories
            .values()
            .filter(|s| s.belongs_to(id))
            .count();
        let tickets = state.tickets.values().filter(|t| t.category == id).count();
        blocked(
            "category",
            &[("subcategories", subcategories), ("tickets", tickets)],
        )?;
        state.categories.remove(&id);
        Ok(())
    }

    fn delete_subcategory(&self, id: SubCategoryId) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if !state.subcategories.contains_key(&id) {
            return Err(StoreError::NotFound {
                entity: "subcategory",
            });
        }
        let tickets = state
            .tickets
            .values()
            .filter(|t| t.subcategory == id)
            .count();
        blocked("subcategory", &[("tickets", tickets)])?;
        state.subcategories.remove(&id);
        Ok(())
    }
}

impl UserRepository for InMemoryStore {
    fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut state = self.state()?;
        if state
            .users
            .values()
            .any(|existing| existing.username == user.username)
        {
            return Err(StoreError::Conflict {
                entity: "user",
                detail: format!("username {}", user.username),
            });
        }
        state.check_sole_super_admin(&user)?;
        state.check_user_references(&user)?;
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn update_user(&self, user: User) -> Result<User, StoreError> {
        let mut state = self.state()?;
        ensure_exists(&state.users, &user.id, "user")?;
        if state
            .users
            .values()
            .any(|existing| existing.id != user.id && existing.username == user.username)
        {
            return Err(StoreError::Conflict {
                entity: "user",
                detail: format!("username {}", user.username),
            });
        }
        state.check_sole_super_admin(&user)?;
        state.check_user_references(&user)?;
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state()?.users.get(&id).cloned())
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .state()?
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    fn users(&self) -> Result<Vec<User>, StoreError> {
        let state = self.state()?;
        Ok(sorted_by_name(state.users.values().cloned(), |u| u.username.as_str()))
    }
}

impl TicketRepository for InMemoryStore {
    fn insert_numbered(
        &self,
        build: &mut dyn FnMut(TicketNumber) -> Ticket,
    ) -> Result<Ticket, StoreError> {
        let mut state = self.state()?;
        let number = state.next_number();
        let ticket = build(number);
        if ticket.number != number {
            return Err(StoreError::NumberTaken(ticket.number));
        }
        if state.tickets.contains_key(&ticket.id) {
            return Err(StoreError::Conflict {
                entity: "ticket",
                detail: format!("id {}", ticket.id),
            });
        }
        state.check_ticket_references(&ticket)?;
        state.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    fn update_ticket(&self, ticket: Ticket) -> Result<Ticket, StoreError> {
        let mut state = self.state()?;
        let existing = state
            .tickets
            .get(&ticket.id)
            .ok_or(StoreError::NotFound { entity: "ticket" })?;

        let immutable = [
            ("number", existing.number != ticket.number),
            ("submitted_at", existing.submitted_at != ticket.submitted_at),
            ("submitted_by", existing.submitted_by != ticket.submitted_by),
            ("title", existing.title != ticket.title),
        ];
        if existing.revision != ticket.revision {
            return Err(StoreError::StaleWrite {
                entity: "ticket",
                expected: ticket.revision,
                stored: existing.revision,
            });
        }
        if let Some((field, _)) = immutable.into_iter().find(|(_, changed)| *changed) {
            return Err(StoreError::ImmutableField { field });
        }

        state.check_ticket_references(&ticket)?;
        let ticket = Ticket {
            revision: ticket.revision + 1,
            ..ticket
        };
        state.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.state()?.tickets.get(&id).cloned())
    }

    fn ticket_by_number(&self, number: TicketNumber) -> Result<Option<Ticket>, StoreError> {
        Ok(self
            .state()?
            .tickets
            .values()
            .find(|ticket| ticket.number == number)
            .cloned())
    }

    fn tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        let state = self.state()?;
        let mut tickets: Vec<Ticket> = state.tickets.values().cloned().collect();
        tickets.sort_by_key(|ticket| ticket.number);
        Ok(tickets)
    }
}
