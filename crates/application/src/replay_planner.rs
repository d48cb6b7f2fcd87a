use std::collections::{HashMap, HashSet};

use grantshift_core::{AppError, AppResult};
use grantshift_domain::{
    FutureGrantRecord, GENERATED_PASSWORD_LENGTH, GrantCategory, GrantRecord, GrantedOn,
    GranteeKind, Instruction, ObjectName, Password, ProjectRoleSet,
};

mod passwords;

pub use passwords::generate_password;

/// Privileges the destination edition does not support; grants of them are dropped.
pub const UNSUPPORTED_PRIVILEGES: &[&str] =
    &["CREATE BUDGET", "CREATE SNOWFLAKE.ML.ANOMALY_DETECTION"];

/// Returns true for privileges that are never replayed.
#[must_use]
pub fn is_unsupported_privilege(privilege: &str) -> bool {
    UNSUPPORTED_PRIVILEGES
        .iter()
        .any(|unsupported| unsupported.eq_ignore_ascii_case(privilege.trim()))
}

/// Ordered replay of one project.
///
/// `access` holds roles, users and account-wide grants and can run before any
/// database object exists. `objects` holds grants on database objects and runs
/// while those objects are created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayPlan {
    access: Vec<Instruction>,
    objects: Vec<Instruction>,
}

impl ReplayPlan {
    /// Returns role, user and account-level instructions.
    #[must_use]
    pub fn access(&self) -> &[Instruction] {
        &self.access
    }

    /// Returns grants on database objects.
    #[must_use]
    pub fn objects(&self) -> &[Instruction] {
        &self.objects
    }

    /// Iterates the whole plan in replay order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.access.iter().chain(self.objects.iter())
    }

    /// Returns the total number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.access.len() + self.objects.len()
    }

    /// Returns true when nothing is to be replayed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns object instructions granting on one named object, ownership first.
    #[must_use]
    pub fn object_instructions(&self, on: &GrantedOn, name: &ObjectName) -> Vec<&Instruction> {
        self.objects
            .iter()
            .filter(|instruction| {
                instruction.grant().is_some_and(|grant| {
                    grant.granted_on() == on
                        && grant.parsed_name().is_ok_and(|parsed| names_match(on, &parsed, name))
                })
            })
            .collect()
    }

    /// Returns future grant instructions scoped to one schema or database.
    #[must_use]
    pub fn future_instructions(&self, container: &ObjectName) -> Vec<&Instruction> {
        self.objects
            .iter()
            .filter(|instruction| match instruction {
                Instruction::AssignFutureGrant { grant, .. } => grant
                    .parsed_container()
                    .is_ok_and(|parsed| parsed == *container),
                _ => false,
            })
            .collect()
    }
}

// Routine grants carry the signature in the last part; match on the bare name.
pub(crate) fn names_match(on: &GrantedOn, parsed: &ObjectName, name: &ObjectName) -> bool {
    if !matches!(on, GrantedOn::Function | GrantedOn::Procedure) {
        return parsed == name;
    }

    let bare = |object: &ObjectName| {
        let mut parts = object.parts().to_vec();
        if let Some(last) = parts.last_mut() {
            if let Some(index) = last.find('(') {
                last.truncate(index);
            }
        }
        parts
    };
    bare(parsed) == bare(name)
}

/// Computes a safe replay order for a project's roles, users and grants.
///
/// Every instruction runs under an acting role that was created earlier in the
/// plan or that exists before the replay starts.
#[derive(Debug, Clone)]
pub struct ReplayPlanner {
    main_role: String,
    passwords: HashMap<String, Password>,
}

impl ReplayPlanner {
    /// Creates a planner; the main role is assumed to exist in the destination.
    #[must_use]
    pub fn new(main_role: impl Into<String>) -> Self {
        Self {
            main_role: main_role.into(),
            passwords: HashMap::new(),
        }
    }

    /// Uses configured passwords instead of generated ones for the named users.
    #[must_use]
    pub fn with_passwords(mut self, passwords: HashMap<String, Password>) -> Self {
        self.passwords = passwords;
        self
    }

    /// Orders the replay of one project.
    ///
    /// Fails with `CyclicRoleGraph` if role creation would need a role that is
    /// itself still waiting to be created.
    pub fn plan(&self, set: &ProjectRoleSet) -> AppResult<ReplayPlan> {
        let mut builder = PlanBuilder::new(set, &self.main_role);

        builder.ensure_role(set.seed_role())?;
        for role in set.roles() {
            builder.ensure_role(role.name())?;
        }

        for user in set.users() {
            let acting_role = builder.creator_of_user(user.name(), user.owner());
            builder.ensure_role(&acting_role)?;
            let password = match self.passwords.get(user.name()) {
                Some(password) => password.clone(),
                None => generate_password(GENERATED_PASSWORD_LENGTH)?,
            };
            builder.access.push(Instruction::CreateUser {
                user: user.clone(),
                acting_role,
                password,
            });
        }

        for category in [
            GrantCategory::Account,
            GrantCategory::Role,
            GrantCategory::Warehouse,
            GrantCategory::User,
        ] {
            builder.push_category(category, Section::Access)?;
        }

        builder.push_database_grants()?;
        builder.push_category(GrantCategory::Schema, Section::Objects)?;
        for future_grant in set.future_table_grants() {
            builder.push_future_grant(future_grant)?;
        }
        for category in [
            GrantCategory::Table,
            GrantCategory::View,
            GrantCategory::Function,
            GrantCategory::Procedure,
        ] {
            builder.push_category(category, Section::Objects)?;
        }

        Ok(ReplayPlan {
            access: builder.access,
            objects: builder.objects,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Section {
    Access,
    Objects,
}

struct PlanBuilder<'a> {
    set: &'a ProjectRoleSet,
    main_role: &'a str,
    role_ownership: HashMap<&'a str, &'a GrantRecord>,
    user_ownership: HashMap<&'a str, &'a GrantRecord>,
    created: HashSet<String>,
    in_progress: HashSet<String>,
    access: Vec<Instruction>,
    objects: Vec<Instruction>,
}

impl<'a> PlanBuilder<'a> {
    fn new(set: &'a ProjectRoleSet, main_role: &'a str) -> Self {
        let ownership_on = move |category: GrantCategory| {
            set.grants_in(category)
                .filter(|grant| grant.is_ownership())
                .map(|grant| (grant.object_name(), grant))
                .collect::<HashMap<_, _>>()
        };

        Self {
            set,
            main_role,
            role_ownership: ownership_on(GrantCategory::Role),
            user_ownership: ownership_on(GrantCategory::User),
            created: HashSet::new(),
            in_progress: HashSet::new(),
            access: Vec::new(),
            objects: Vec::new(),
        }
    }

    // Roles outside the set already exist in the destination.
    fn ensure_role(&mut self, role: &str) -> AppResult<()> {
        if self.created.contains(role) || !self.set.contains(role) {
            return Ok(());
        }
        if !self.in_progress.insert(role.to_owned()) {
            return Err(AppError::CyclicRoleGraph {
                role: role.to_owned(),
            });
        }

        let acting_role = self.creator_of_role(role);
        self.ensure_role(&acting_role)?;
        self.access.push(Instruction::CreateRole {
            role: role.to_owned(),
            acting_role,
        });

        self.in_progress.remove(role);
        self.created.insert(role.to_owned());
        Ok(())
    }

    fn creator_of_role(&self, role: &str) -> String {
        if role == self.set.seed_role() {
            return self.main_role.to_owned();
        }

        match self.role_ownership.get(role) {
            Some(grant) if !grant.granted_by().is_empty() => grant.granted_by().to_owned(),
            Some(grant) => grant.grantee_name().to_owned(),
            None => self
                .set
                .role(role)
                .map_or_else(|| self.main_role.to_owned(), |known| known.owner().to_owned()),
        }
    }

    fn creator_of_user(&self, user: &str, owner: &str) -> String {
        match self.user_ownership.get(user) {
            Some(grant) if !grant.granted_by().is_empty() => grant.granted_by().to_owned(),
            _ => owner.to_owned(),
        }
    }

    fn normalize(&self, grant: &GrantRecord) -> Option<GrantRecord> {
        if is_unsupported_privilege(grant.privilege()) {
            return None;
        }
        if grant.granted_by().is_empty() {
            return Some(grant.with_granted_by(self.main_role));
        }

        Some(grant.clone())
    }

    fn push_grant(&mut self, grant: GrantRecord, section: Section) -> AppResult<()> {
        if grant.granted_to() == GranteeKind::Role {
            self.ensure_role(grant.grantee_name())?;
        }
        self.ensure_role(grant.granted_by())?;

        let instruction = Instruction::AssignGrant(grant);
        match section {
            Section::Access => self.access.push(instruction),
            Section::Objects => self.objects.push(instruction),
        }
        Ok(())
    }

    // Ownership first, then the rest, each in enumeration order.
    fn push_category(&mut self, category: GrantCategory, section: Section) -> AppResult<()> {
        let set = self.set;
        let (ownership, others): (Vec<&GrantRecord>, Vec<&GrantRecord>) =
            set.grants_in(category).partition(|grant| grant.is_ownership());

        for grant in ownership {
            if grant.is_self_granted_ownership() {
                continue;
            }
            if let Some(grant) = self.normalize(grant) {
                self.push_grant(grant, section)?;
            }
        }
        for grant in others {
            if let Some(grant) = self.normalize(grant) {
                self.push_grant(grant, section)?;
            }
        }

        Ok(())
    }

    // Databases are created by the main role, which then hands ownership over.
    fn push_database_grants(&mut self) -> AppResult<()> {
        let set = self.set;
        let (ownership, others): (Vec<&GrantRecord>, Vec<&GrantRecord>) = set
            .grants_in(GrantCategory::Database)
            .partition(|grant| grant.is_ownership());

        for grant in ownership {
            let grant = grant.with_granted_by(self.main_role);
            self.push_grant(grant, Section::Objects)?;
        }
        for grant in others {
            if let Some(grant) = self.normalize(grant) {
                self.push_grant(grant, Section::Objects)?;
            }
        }

        Ok(())
    }

    fn push_future_grant(&mut self, grant: &FutureGrantRecord) -> AppResult<()> {
        if is_unsupported_privilege(grant.privilege()) {
            return Ok(());
        }

        let acting_role = self.schema_owner(grant).unwrap_or(self.set.seed_role()).to_owned();
        if grant.grant_to() == GranteeKind::Role {
            self.ensure_role(grant.grantee_name())?;
        }
        self.ensure_role(&acting_role)?;
        self.objects.push(Instruction::AssignFutureGrant {
            grant: grant.clone(),
            acting_role,
        });
        Ok(())
    }

    fn schema_owner(&self, grant: &FutureGrantRecord) -> Option<&'a str> {
        let container = grant.parsed_container().ok()?;
        self.set
            .grants_in(GrantCategory::Schema)
            .find(|schema_grant| {
                schema_grant.is_ownership()
                    && schema_grant
                        .parsed_name()
                        .is_ok_and(|name| name == container)
            })
            .map(GrantRecord::grantee_name)
    }
}
