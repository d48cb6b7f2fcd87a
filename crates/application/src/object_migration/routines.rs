use grantshift_domain::{MetadataRow, RoutineKind};

use super::*;
use crate::replay_planner::ReplayPlan;

/// Views may depend on each other; each pass retries the ones that failed.
const VIEW_PASSES: usize = 5;

impl ObjectMigration {
    pub(super) async fn copy_views(
        &self,
        source: &mut Session,
        destination: &mut Session,
        set: &ProjectRoleSet,
        plan: &ReplayPlan,
        report: &mut ObjectMigrationReport,
    ) -> AppResult<()> {
        let database = set.database();
        info!(database = %database, "cloning views");

        let source_user = source.user().to_owned();
        source.use_default_role().await?;
        source
            .grant_role_to_user(set.seed_role(), &source_user)
            .await?;
        source.use_role(set.seed_role()).await?;

        let mut pending: Vec<MetadataRow> = source
            .views_in(database)
            .await?
            .into_iter()
            .filter(|view| {
                view.get("schema_name")
                    .is_some_and(|schema| self.is_migrated_schema(schema))
            })
            .collect();

        for pass in 0..VIEW_PASSES {
            if pending.is_empty() {
                break;
            }
            if pass > 0 {
                info!(count = pending.len(), "retrying failed views");
            }

            let mut failed = Vec::new();
            for view in pending {
                let schema = view.require("schema_name")?;
                let name = ObjectName::from_parts([database, schema, view.require("name")?]);
                let owner = view.require("owner")?;
                if !self.use_owner_warehouse(destination, owner, &name).await? {
                    report.skipped += 1;
                    continue;
                }

                destination.use_role(owner).await?;
                destination.use_schema(database, schema).await?;
                let create = Statement::Verbatim(view.require("text")?.to_owned());
                match destination.run(&create).await {
                    Ok(()) => report.views += 1,
                    Err(error) if error.is_statement_failure() => {
                        warn!(view = %name, error = %error, "failed to create view");
                        failed.push(view);
                    }
                    Err(error) => return Err(error),
                }
            }
            pending = failed;
        }

        if !pending.is_empty() {
            warn!(count = pending.len(), "views could not be created");
            report.skipped += pending.len();
        }

        let grants = secondary_grants(plan.objects(), GrantCategory::View);
        report
            .replay
            .absorb(self.executor.execute(destination, grants).await?);
        Ok(())
    }

    pub(super) async fn copy_routines(
        &self,
        source: &mut Session,
        destination: &mut Session,
        set: &ProjectRoleSet,
        plan: &ReplayPlan,
        report: &mut ObjectMigrationReport,
    ) -> AppResult<()> {
        let database = set.database();
        for kind in [RoutineKind::Function, RoutineKind::Procedure] {
            info!(database = %database, kind = %kind, "cloning routines");
            let granted_on = match kind {
                RoutineKind::Function => GrantedOn::Function,
                RoutineKind::Procedure => GrantedOn::Procedure,
            };

            for routine in source.routines_in(kind, database).await? {
                if !self.is_migrated_schema(routine.schema()) {
                    continue;
                }
                let name = routine.object_name();
                let ddl = match routine.to_ddl() {
                    Ok(ddl) => ddl,
                    Err(error) => {
                        warn!(routine = %name, error = %error, "skipping routine");
                        report.skipped += 1;
                        continue;
                    }
                };
                let Some(ownership) = ownership_in(set, &granted_on, &name) else {
                    warn!(routine = %name, "routine ownership not found, skipping routine");
                    report.skipped += 1;
                    continue;
                };
                let owner = ownership.granted_by();
                if !self.use_owner_warehouse(destination, owner, &name).await? {
                    report.skipped += 1;
                    continue;
                }

                destination.use_role(owner).await?;
                destination
                    .use_schema(routine.database(), routine.schema())
                    .await?;
                match destination.run(&Statement::Verbatim(ddl)).await {
                    Ok(()) => report.routines += 1,
                    Err(error) if error.is_statement_failure() => {
                        warn!(routine = %name, error = %error, "failed to create routine");
                        report.skipped += 1;
                    }
                    Err(error) => return Err(error),
                }
            }

            let grants = secondary_grants(plan.objects(), granted_on.category());
            report
                .replay
                .absorb(self.executor.execute(destination, grants).await?);
        }

        Ok(())
    }
}
