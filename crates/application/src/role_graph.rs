use std::collections::{BTreeSet, HashMap, VecDeque};

use grantshift_core::{AppError, AppResult};
use grantshift_domain::{
    FutureGrantRecord, GrantRecord, GrantedOn, ProjectRoleSet, Role, RoleFutureGrants,
    RoleGrants, UserDefinition, is_workspace_role,
};
use tracing::{debug, info};

use crate::Session;

/// Discovers the transitive role closure owning a set of databases.
///
/// Grant lookups are cached per role, so the main role and every project role
/// are fetched from the source at most once.
#[derive(Debug, Default)]
pub struct RoleGraphBuilder {
    grants: HashMap<String, Vec<GrantRecord>>,
    future_grants: HashMap<String, Vec<FutureGrantRecord>>,
}

impl RoleGraphBuilder {
    /// Creates a builder with empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one role set per database, in input order.
    ///
    /// Fails with `AmbiguousOwnership` when a database has no single owner and with
    /// `CyclicRoleGraph` when a role is reached through two different owners.
    pub async fn discover(
        &mut self,
        session: &mut Session,
        databases: &[String],
    ) -> AppResult<Vec<ProjectRoleSet>> {
        let mut sets = Vec::with_capacity(databases.len());

        for database in databases {
            let mut visited: HashMap<String, String> = HashMap::new();
            let seed_role = session.ownership_role_on_database(database).await?;
            let seed_owner = role_owner(session, &seed_role).await?;
            info!(database = %database, seed_role = %seed_role, "discovering role closure");

            let mut set = ProjectRoleSet::new(database.as_str(), seed_role.as_str());
            let mut queue = VecDeque::from([(seed_role, seed_owner)]);

            while let Some((name, owner)) = queue.pop_front() {
                if let Some(known_owner) = visited.get(&name) {
                    if *known_owner != owner {
                        return Err(AppError::CyclicRoleGraph { role: name });
                    }
                    continue;
                }
                visited.insert(name.clone(), owner.clone());

                for grant in self.grants_of(session, &name).await? {
                    if !grant.is_ownership() || grant.granted_on() != &GrantedOn::Role {
                        continue;
                    }
                    let child = grant.object_name();
                    if child == name {
                        return Err(AppError::CyclicRoleGraph { role: name });
                    }
                    if is_workspace_role(child) {
                        debug!(role = %child, "skipping workspace role");
                        continue;
                    }
                    queue.push_back((child.to_owned(), name.clone()));
                }

                set.insert_role(Role::new(name, owner))?;
            }

            sets.push(set);
        }

        for set in &mut sets {
            self.attach(session, set).await?;
        }

        Ok(sets)
    }

    /// Resolves the single role owning every seed role, with its grants attached.
    pub async fn main_role(
        &mut self,
        session: &mut Session,
        sets: &[ProjectRoleSet],
    ) -> AppResult<Role> {
        let owners: BTreeSet<&str> = sets
            .iter()
            .filter_map(|set| set.role(set.seed_role()))
            .map(Role::owner)
            .collect();

        let main_role = match owners.into_iter().collect::<Vec<_>>().as_slice() {
            [owner] => (*owner).to_owned(),
            owners => {
                return Err(AppError::AmbiguousOwnership {
                    object: "main project role".to_owned(),
                    owners: owners.len(),
                });
            }
        };

        let owner = role_owner(session, &main_role).await?;
        let mut role = Role::new(main_role.as_str(), owner);
        let grants = self.grants_of(session, &main_role).await?;
        role.attach_grants(RoleGrants::from_records(grants))?;
        let future_grants = self.future_grants_of(session, &main_role).await?;
        role.attach_future_grants(RoleFutureGrants::from_records(future_grants))?;

        info!(main_role = %main_role, "resolved main role");
        Ok(role)
    }

    async fn attach(&mut self, session: &mut Session, set: &mut ProjectRoleSet) -> AppResult<()> {
        let names: Vec<String> = set.roles().map(|role| role.name().to_owned()).collect();

        for name in &names {
            let grants = self.grants_of(session, name).await?;
            let future_grants = self.future_grants_of(session, name).await?;

            let owned_users: Vec<&GrantRecord> = grants
                .iter()
                .filter(|grant| grant.is_ownership() && grant.granted_on() == &GrantedOn::User)
                .collect();
            for grant in owned_users {
                match session.find_user(grant.object_name()).await? {
                    Some(row) => set.add_user(UserDefinition::from_row(&row, name.as_str())?),
                    None => debug!(user = %grant.object_name(), "owned user not visible"),
                }
            }

            if let Some(role) = set.role_mut(name) {
                role.attach_grants(RoleGrants::from_records(grants))?;
                role.attach_future_grants(RoleFutureGrants::from_records(future_grants))?;
            }
        }

        Ok(())
    }

    async fn grants_of(&mut self, session: &mut Session, role: &str) -> AppResult<Vec<GrantRecord>> {
        if let Some(grants) = self.grants.get(role) {
            return Ok(grants.clone());
        }

        let grants = session.grants_to_role(role).await?;
        self.grants.insert(role.to_owned(), grants.clone());
        Ok(grants)
    }

    async fn future_grants_of(
        &mut self,
        session: &mut Session,
        role: &str,
    ) -> AppResult<Vec<FutureGrantRecord>> {
        if let Some(grants) = self.future_grants.get(role) {
            return Ok(grants.clone());
        }

        let grants = session.future_grants_to_role(role).await?;
        self.future_grants.insert(role.to_owned(), grants.clone());
        Ok(grants)
    }
}

async fn role_owner(session: &mut Session, role: &str) -> AppResult<String> {
    let row = session.find_role(role).await?.ok_or_else(|| {
        AppError::ObjectNotFound(format!(
            "role '{role}' does not exist in the {} account",
            session.account()
        ))
    })?;

    Ok(row.require("owner")?.to_owned())
}
