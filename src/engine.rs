use crate::cache::{Cache, NoCache};
use crate::config::CacheConfig;
use crate::error::{Error, Result, StoreError};
use crate::model::{
    NewPermission, NewRole, Permission, PermissionUpdate, Role, RoleUpdate, RoleWithPermissions,
};
use crate::permission::PermissionCode;
use crate::permission_cache::{CacheStats, PermissionCache};
use crate::store::Store;
use crate::types::{PermissionId, RoleId, RoleName, UserId};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

/// RBAC engine with pluggable grant store and optional cache.
///
/// Reads go through the cache first and fall back to the store on a miss.
/// Grant mutations write the store, then invalidate the affected cache
/// entries. User-scoped mutations clear every view of that user; role-scoped
/// mutations only clear the role's own entry, so user views built before the
/// change stay visible until their TTL runs out. Permission mutations clear
/// the whole cache, since any role, user or check entry may carry the code.
#[derive(Debug)]
pub struct Engine<S, C = NoCache> {
    store: S,
    cache: PermissionCache<C>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder<S, C = NoCache> {
    store: S,
    cache: C,
    config: CacheConfig,
}

impl<S> EngineBuilder<S, NoCache> {
    /// Creates a new builder with default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: NoCache,
            config: CacheConfig::default(),
        }
    }
}

impl<S, C> EngineBuilder<S, C> {
    /// Sets the cache settings.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the cache implementation.
    pub fn cache<C2: Cache>(self, cache: C2) -> EngineBuilder<S, C2> {
        EngineBuilder {
            store: self.store,
            cache,
            config: self.config,
        }
    }

    /// Builds the engine.
    pub fn build(self) -> Engine<S, C> {
        Engine {
            store: self.store,
            cache: PermissionCache::new(self.cache, self.config),
        }
    }
}

fn store_failure(operation: &'static str) -> impl FnOnce(StoreError) -> Error {
    move |source| {
        error!(operation, error = %source, "grant store call failed");
        Error::StoreUnavailable(source)
    }
}

impl<S, C> Engine<S, C> {
    /// Returns the grant store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the permission cache.
    pub fn permission_cache(&self) -> &PermissionCache<C> {
        &self.cache
    }
}

impl<S, C> Engine<S, C>
where
    S: Store,
    C: Cache,
{
    /// Returns whether `user` currently holds `code`.
    ///
    /// `Ok(false)` is a confirmed denial. An error means the store could not
    /// answer and must not be read as either outcome. Both outcomes are
    /// cached; errors are not.
    pub async fn check_permission(&self, user: UserId, code: &PermissionCode) -> Result<bool> {
        if let Some(allowed) = self.cache.check(user, code).await {
            return Ok(allowed);
        }

        let allowed = self
            .store
            .has_permission(user, code)
            .await
            .map_err(store_failure("has_permission"))?;
        self.cache.set_check(user, code, allowed).await;
        Ok(allowed)
    }

    /// Like [`Engine::check_permission`] but turns a denial into
    /// [`Error::PermissionDenied`].
    pub async fn require_permission(&self, user: UserId, code: &PermissionCode) -> Result<()> {
        if self.check_permission(user, code).await? {
            return Ok(());
        }
        warn!(user_id = %user, permission = %code, "permission denied");
        Err(Error::PermissionDenied {
            user,
            permission: code.to_string(),
        })
    }

    /// Returns true when `user` holds at least one of `codes`.
    ///
    /// Stops at the first granted code. An empty list grants nothing.
    pub async fn check_any_permission(
        &self,
        user: UserId,
        codes: &[PermissionCode],
    ) -> Result<bool> {
        for code in codes {
            if self.check_permission(user, code).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns true when `user` holds every one of `codes`.
    ///
    /// Stops at the first denied code. An empty list is vacuously granted.
    pub async fn check_all_permissions(
        &self,
        user: UserId,
        codes: &[PermissionCode],
    ) -> Result<bool> {
        for code in codes {
            if !self.check_permission(user, code).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns the sorted set of codes `user` holds.
    pub async fn get_user_permissions(&self, user: UserId) -> Result<Vec<PermissionCode>> {
        if let Some(codes) = self.cache.user_permissions(user).await {
            return Ok(codes);
        }

        let codes = self
            .store
            .user_permission_codes(user)
            .await
            .map_err(store_failure("user_permission_codes"))?;
        self.cache.set_user_permissions(user, &codes).await;
        Ok(codes)
    }

    /// Returns the sorted codes of enabled permissions assigned to `role`.
    pub async fn get_role_permissions(&self, role: RoleId) -> Result<Vec<PermissionCode>> {
        if let Some(codes) = self.cache.role_permissions(role).await {
            return Ok(codes);
        }

        let codes = self
            .store
            .role_permission_codes(role)
            .await
            .map_err(store_failure("role_permission_codes"))?;
        self.cache.set_role_permissions(role, &codes).await;
        Ok(codes)
    }

    /// Returns the live roles assigned to `user`.
    pub async fn get_user_roles(&self, user: UserId) -> Result<Vec<Role>> {
        let roles = match self.cache.user_roles(user).await {
            Some(roles) => roles,
            None => {
                let roles = self
                    .store
                    .user_role_ids(user)
                    .await
                    .map_err(store_failure("user_role_ids"))?;
                self.cache.set_user_roles(user, &roles).await;
                roles
            }
        };
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .roles_by_ids(&roles)
            .await
            .map_err(store_failure("roles_by_ids"))
    }

    /// Creates a role. Fails with [`Error::RoleAlreadyExists`] when a live role
    /// has the same name.
    pub async fn create_role(&self, role: NewRole) -> Result<Role> {
        let name = role.name.clone();
        if self.find_role_by_name(&name).await?.is_some() {
            return Err(Error::RoleAlreadyExists {
                name: name.to_string(),
            });
        }
        let created = self
            .store
            .insert_role(role)
            .await
            .map_err(store_failure("insert_role"))?
            .ok_or_else(|| Error::RoleAlreadyExists {
                name: name.to_string(),
            })?;
        debug!(role_id = %created.id, name = %created.name, "role created");
        Ok(created)
    }

    /// Applies a partial update to a role.
    pub async fn update_role(&self, role: RoleId, update: RoleUpdate) -> Result<Role> {
        let mut current = self.get_role(role).await?;
        if let Some(name) = update.name.as_ref().filter(|name| **name != current.name) {
            if self.find_role_by_name(name).await?.is_some() {
                return Err(Error::RoleAlreadyExists {
                    name: name.to_string(),
                });
            }
        }
        update.apply(&mut current);
        let name = current.name.to_string();
        let updated = self
            .store
            .update_role(current)
            .await
            .map_err(store_failure("update_role"))?;
        let Some(updated) = updated else {
            return match self.find_role(role).await? {
                Some(_) => Err(Error::RoleAlreadyExists { name }),
                None => Err(Error::RoleNotFound { role }),
            };
        };
        self.cache.invalidate_role(role).await;
        Ok(updated)
    }

    /// Soft-deletes a role.
    pub async fn delete_role(&self, role: RoleId) -> Result<()> {
        let deleted = self
            .store
            .soft_delete_role(role)
            .await
            .map_err(store_failure("soft_delete_role"))?;
        if !deleted {
            return Err(Error::RoleNotFound { role });
        }
        self.cache.invalidate_role(role).await;
        Ok(())
    }

    /// Returns a live role.
    pub async fn get_role(&self, role: RoleId) -> Result<Role> {
        self.find_role(role)
            .await?
            .ok_or(Error::RoleNotFound { role })
    }

    /// Returns a live role by exact name.
    pub async fn get_role_by_name(&self, name: &RoleName) -> Result<Option<Role>> {
        self.find_role_by_name(name).await
    }

    /// Lists live roles.
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.store
            .list_roles()
            .await
            .map_err(store_failure("list_roles"))
    }

    /// Returns a role with every live permission assigned to it, disabled
    /// ones included. Always read from the store.
    pub async fn get_role_with_permissions(&self, role: RoleId) -> Result<RoleWithPermissions> {
        let record = self.get_role(role).await?;
        let permissions = self
            .store
            .role_permissions(role)
            .await
            .map_err(store_failure("role_permissions"))?;
        Ok(RoleWithPermissions {
            role: record,
            permissions,
        })
    }

    /// Creates a permission. Fails with [`Error::PermissionAlreadyExists`] when
    /// a live permission has the same code.
    pub async fn create_permission(&self, permission: NewPermission) -> Result<Permission> {
        let code = permission.code.clone();
        if self.find_permission_by_code(&code).await?.is_some() {
            return Err(Error::PermissionAlreadyExists {
                code: code.to_string(),
            });
        }
        self.store
            .insert_permission(permission)
            .await
            .map_err(store_failure("insert_permission"))?
            .ok_or_else(|| Error::PermissionAlreadyExists {
                code: code.to_string(),
            })
    }

    /// Applies a partial update to a permission and clears the whole cache.
    ///
    /// Fails with [`Error::PermissionAlreadyExists`] when another live
    /// permission already has the new code.
    pub async fn update_permission(
        &self,
        permission: PermissionId,
        update: PermissionUpdate,
    ) -> Result<Permission> {
        let mut current = self.get_permission(permission).await?;
        if let Some(code) = update.code.as_ref().filter(|code| **code != current.code) {
            if self.find_permission_by_code(code).await?.is_some() {
                return Err(Error::PermissionAlreadyExists {
                    code: code.to_string(),
                });
            }
        }
        update.apply(&mut current);
        let code = current.code.to_string();
        let updated = self
            .store
            .update_permission(current)
            .await
            .map_err(store_failure("update_permission"))?;
        let Some(updated) = updated else {
            return match self.find_permission(permission).await? {
                Some(_) => Err(Error::PermissionAlreadyExists { code }),
                None => Err(Error::PermissionNotFound { permission }),
            };
        };
        self.cache.invalidate_all().await;
        Ok(updated)
    }

    /// Soft-deletes a permission and clears the whole cache.
    pub async fn delete_permission(&self, permission: PermissionId) -> Result<()> {
        let deleted = self
            .store
            .soft_delete_permission(permission)
            .await
            .map_err(store_failure("soft_delete_permission"))?;
        if !deleted {
            return Err(Error::PermissionNotFound { permission });
        }
        self.cache.invalidate_all().await;
        Ok(())
    }

    /// Returns a live permission.
    pub async fn get_permission(&self, permission: PermissionId) -> Result<Permission> {
        self.find_permission(permission)
            .await?
            .ok_or(Error::PermissionNotFound { permission })
    }

    /// Lists live permissions.
    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        self.store
            .list_permissions()
            .await
            .map_err(store_failure("list_permissions"))
    }

    /// Grants permissions to a role and drops the role's cached permissions.
    ///
    /// Every id must name a live permission; nothing is written otherwise.
    /// Cached views of users holding the role are not touched.
    pub async fn assign_permissions_to_role(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<()> {
        self.get_role(role).await?;
        if permissions.is_empty() {
            return Ok(());
        }
        let found = self
            .store
            .permissions_by_ids(permissions)
            .await
            .map_err(store_failure("permissions_by_ids"))?;
        let found: BTreeSet<PermissionId> = found.into_iter().map(|p| p.id).collect();
        if let Some(missing) = permissions.iter().find(|id| !found.contains(id)) {
            return Err(Error::PermissionNotFound {
                permission: *missing,
            });
        }

        self.store
            .add_role_permissions(role, permissions)
            .await
            .map_err(store_failure("add_role_permissions"))?;
        self.cache.invalidate_role(role).await;
        Ok(())
    }

    /// Revokes permissions from a role and drops the role's cached permissions.
    ///
    /// Unassigned ids are ignored. Cached views of users holding the role are
    /// not touched.
    pub async fn remove_permissions_from_role(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<()> {
        self.store
            .remove_role_permissions(role, permissions)
            .await
            .map_err(store_failure("remove_role_permissions"))?;
        self.cache.invalidate_role(role).await;
        Ok(())
    }

    /// Assigns a role to a user and clears every cached view of that user.
    ///
    /// Assigning a role the user already holds is a no-op write.
    pub async fn assign_role_to_user(&self, user: UserId, role: RoleId) -> Result<()> {
        self.get_role(role).await?;
        self.store
            .add_user_role(user, role)
            .await
            .map_err(store_failure("add_user_role"))?;
        self.cache.invalidate_user(user).await;
        Ok(())
    }

    /// Removes a role from a user and clears every cached view of that user.
    ///
    /// Removing a role the user does not hold succeeds.
    pub async fn remove_role_from_user(&self, user: UserId, role: RoleId) -> Result<()> {
        self.store
            .remove_user_role(user, role)
            .await
            .map_err(store_failure("remove_user_role"))?;
        self.cache.invalidate_user(user).await;
        Ok(())
    }

    /// Clears every cached view of a user.
    pub async fn invalidate_user_cache(&self, user: UserId) {
        self.cache.invalidate_user(user).await;
    }

    /// Clears the cached permissions of a role.
    pub async fn invalidate_role_cache(&self, role: RoleId) {
        self.cache.invalidate_role(role).await;
    }

    /// Clears the whole cache namespace. Returns the number of entries removed.
    pub async fn invalidate_all_cache(&self) -> usize {
        self.cache.invalidate_all().await
    }

    /// Counts cached entries per view.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    async fn find_role(&self, role: RoleId) -> Result<Option<Role>> {
        self.store
            .role_by_id(role)
            .await
            .map_err(store_failure("role_by_id"))
    }

    async fn find_role_by_name(&self, name: &RoleName) -> Result<Option<Role>> {
        self.store
            .role_by_name(name)
            .await
            .map_err(store_failure("role_by_name"))
    }

    async fn find_permission(&self, permission: PermissionId) -> Result<Option<Permission>> {
        self.store
            .permission_by_id(permission)
            .await
            .map_err(store_failure("permission_by_id"))
    }

    async fn find_permission_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>> {
        self.store
            .permission_by_code(code)
            .await
            .map_err(store_failure("permission_by_code"))
    }
}

#[cfg(all(test, feature = "memory-store", feature = "memory-cache"))]
mod tests {
    use super::*;
    use crate::memory_cache::MemoryCache;
    use crate::memory_store::MemoryStore;
    use crate::model::Status;
    use futures::executor::block_on;

    type TestEngine = Engine<MemoryStore, MemoryCache>;

    fn code(value: &str) -> PermissionCode {
        PermissionCode::try_from(value).unwrap()
    }

    fn name(value: &str) -> RoleName {
        RoleName::try_from(value).unwrap()
    }

    fn engine(store: &MemoryStore) -> TestEngine {
        EngineBuilder::new(store.clone())
            .cache(MemoryCache::new(1024))
            .build()
    }

    fn role(engine: &TestEngine, role: &str) -> RoleId {
        block_on(engine.create_role(NewRole::new(name(role), role)))
            .unwrap()
            .id
    }

    fn permission(engine: &TestEngine, value: &str) -> PermissionId {
        block_on(engine.create_permission(NewPermission::new(code(value), value)))
            .unwrap()
            .id
    }

    /// `editor` grants `article:write` to user 42.
    fn editor_setup() -> (MemoryStore, TestEngine, UserId, RoleId, PermissionId) {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let editor = role(&engine, "editor");
        let write = permission(&engine, "article:write");
        block_on(engine.assign_permissions_to_role(editor, &[write])).unwrap();
        let user = UserId::new(42);
        block_on(engine.assign_role_to_user(user, editor)).unwrap();
        (store, engine, user, editor, write)
    }

    #[test]
    fn check_permission_should_serve_repeat_checks_from_cache() {
        let (store, engine, user, _, _) = editor_setup();

        assert!(block_on(engine.check_permission(user, &code("article:write"))).unwrap());
        let after_first = store.join_queries();
        assert!(block_on(engine.check_permission(user, &code("article:write"))).unwrap());
        assert_eq!(store.join_queries(), after_first);
    }

    #[test]
    fn check_permission_should_cache_denials() {
        let (store, engine, user, _, _) = editor_setup();

        assert!(!block_on(engine.check_permission(user, &code("article:delete"))).unwrap());
        let after_first = store.join_queries();
        assert!(!block_on(engine.check_permission(user, &code("article:delete"))).unwrap());
        assert_eq!(store.join_queries(), after_first);
    }

    #[test]
    fn store_failure_should_propagate_without_caching() {
        let (store, engine, user, _, _) = editor_setup();

        store.set_unavailable(true);
        let err = block_on(engine.check_permission(user, &code("article:write"))).unwrap_err();
        assert!(err.is_store_unavailable());

        store.set_unavailable(false);
        let before = store.join_queries();
        assert!(block_on(engine.check_permission(user, &code("article:write"))).unwrap());
        assert_eq!(store.join_queries(), before + 1);
    }

    #[test]
    fn require_permission_should_distinguish_denial_from_outage() {
        let (store, engine, user, _, _) = editor_setup();

        block_on(engine.require_permission(user, &code("article:write"))).unwrap();
        let denied = block_on(engine.require_permission(user, &code("article:delete")));
        assert!(matches!(denied, Err(Error::PermissionDenied { .. })));

        store.set_unavailable(true);
        let outage = block_on(engine.require_permission(user, &code("user:read")));
        assert!(matches!(outage, Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn any_and_all_should_combine_single_checks() {
        let (_, engine, user, _, _) = editor_setup();
        let write = code("article:write");
        let delete = code("article:delete");

        let either = [delete.clone(), write.clone()];
        assert!(block_on(engine.check_any_permission(user, &either)).unwrap());
        assert!(!block_on(engine.check_all_permissions(user, &[write.clone(), delete])).unwrap());
        assert!(block_on(engine.check_all_permissions(user, &[write])).unwrap());
        assert!(!block_on(engine.check_any_permission(user, &[])).unwrap());
        assert!(block_on(engine.check_all_permissions(user, &[])).unwrap());
    }

    #[test]
    fn answers_should_match_with_and_without_cache() {
        let (store, cached, user, _, _) = editor_setup();
        let uncached = EngineBuilder::new(store.clone()).build();

        for value in ["article:write", "article:delete", "user:read"] {
            let code = code(value);
            let cold = block_on(uncached.check_permission(user, &code)).unwrap();
            let warm_first = block_on(cached.check_permission(user, &code)).unwrap();
            let warm_second = block_on(cached.check_permission(user, &code)).unwrap();
            assert_eq!(cold, warm_first);
            assert_eq!(cold, warm_second);
        }
    }

    #[test]
    fn user_permissions_should_be_cached_until_user_invalidation() {
        let (store, engine, user, editor, _) = editor_setup();

        assert_eq!(
            block_on(engine.get_user_permissions(user)).unwrap(),
            vec![code("article:write")]
        );
        let publish = permission(&engine, "article:publish");
        block_on(engine.assign_permissions_to_role(editor, &[publish])).unwrap();

        let before = store.join_queries();
        assert_eq!(
            block_on(engine.get_user_permissions(user)).unwrap(),
            vec![code("article:write")]
        );
        assert_eq!(store.join_queries(), before);

        block_on(engine.invalidate_user_cache(user));
        assert_eq!(
            block_on(engine.get_user_permissions(user)).unwrap(),
            vec![code("article:publish"), code("article:write")]
        );
    }

    #[test]
    fn empty_permission_sets_are_cached_by_default() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let nobody = UserId::new(7);

        let granted = block_on(engine.get_user_permissions(nobody)).unwrap();
        assert!(granted.is_empty());
        let before = store.join_queries();
        let granted = block_on(engine.get_user_permissions(nobody)).unwrap();
        assert!(granted.is_empty());
        assert_eq!(store.join_queries(), before);
    }

    #[test]
    fn empty_permission_sets_requery_when_disabled() {
        let store = MemoryStore::new();
        let engine = EngineBuilder::new(store.clone())
            .cache(MemoryCache::new(64))
            .config(CacheConfig::default().cache_empty_sets(false))
            .build();
        let nobody = UserId::new(7);

        block_on(engine.get_user_permissions(nobody)).unwrap();
        let before = store.join_queries();
        block_on(engine.get_user_permissions(nobody)).unwrap();
        assert_eq!(store.join_queries(), before + 1);
    }

    #[test]
    fn disabled_role_grants_nothing_in_any_view() {
        let (store, engine, user, editor, _) = editor_setup();
        store.set_role_status(editor, Status::Disabled).unwrap();

        assert!(!block_on(engine.check_permission(user, &code("article:write"))).unwrap());
        let granted = block_on(engine.get_user_permissions(user)).unwrap();
        assert!(granted.is_empty());
    }

    #[test]
    fn get_user_roles_should_use_role_id_cache() {
        let (store, engine, user, editor, _) = editor_setup();

        let roles = block_on(engine.get_user_roles(user)).unwrap();
        assert_eq!(roles.iter().map(|r| r.id).collect::<Vec<_>>(), vec![editor]);

        let before = store.join_queries();
        let roles = block_on(engine.get_user_roles(user)).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(store.join_queries(), before);
    }

    #[test]
    fn update_role_should_reject_taken_name() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        role(&engine, "editor");
        let viewer = role(&engine, "viewer");

        let err = block_on(engine.update_role(
            viewer,
            RoleUpdate {
                name: Some(name("editor")),
                ..RoleUpdate::default()
            },
        ))
        .unwrap_err();
        assert!(matches!(err, Error::RoleAlreadyExists { .. }));

        let renamed = block_on(engine.update_role(
            viewer,
            RoleUpdate {
                name: Some(name("reader")),
                description: Some("read only".into()),
                ..RoleUpdate::default()
            },
        ))
        .unwrap();
        assert_eq!(renamed.name, name("reader"));
        assert_eq!(renamed.description, "read only");
    }

    #[test]
    fn deleted_role_cannot_be_assigned() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let editor = role(&engine, "editor");
        block_on(engine.delete_role(editor)).unwrap();

        let err = block_on(engine.assign_role_to_user(UserId::new(1), editor)).unwrap_err();
        assert!(matches!(err, Error::RoleNotFound { .. }));
        let err = block_on(engine.delete_role(editor)).unwrap_err();
        assert!(matches!(err, Error::RoleNotFound { .. }));
    }

    #[test]
    fn assigning_unknown_permission_writes_nothing() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let editor = role(&engine, "editor");
        let write = permission(&engine, "article:write");

        let err = block_on(
            engine.assign_permissions_to_role(editor, &[write, PermissionId::new(999)]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::PermissionNotFound { permission } if permission == PermissionId::new(999)
        ));
        let detail = block_on(engine.get_role_with_permissions(editor)).unwrap();
        assert!(detail.permissions.is_empty());
    }

    #[test]
    fn duplicate_permission_code_is_rejected() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        permission(&engine, "article:write");

        let err = block_on(
            engine.create_permission(NewPermission::new(code("Article:Write"), "again")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::PermissionAlreadyExists { .. }));
    }

    #[test]
    fn update_permission_should_reject_taken_code() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        permission(&engine, "article:write");
        let read = permission(&engine, "article:read");

        let err = block_on(engine.update_permission(
            read,
            PermissionUpdate {
                code: Some(code("article:write")),
                ..PermissionUpdate::default()
            },
        ))
        .unwrap_err();
        assert!(matches!(err, Error::PermissionAlreadyExists { .. }));

        let missing = PermissionId::new(999);
        let update = PermissionUpdate::default();
        let err = block_on(engine.update_permission(missing, update)).unwrap_err();
        assert!(matches!(err, Error::PermissionNotFound { .. }));

        let renamed = block_on(engine.update_permission(
            read,
            PermissionUpdate {
                code: Some(code("comment:read")),
                name: Some("Read comments".into()),
                ..PermissionUpdate::default()
            },
        ))
        .unwrap();
        assert_eq!(renamed.code, code("comment:read"));
        assert_eq!(renamed.resource, "comment");
        assert_eq!(renamed.name, "Read comments");
    }

    #[test]
    fn disabling_permission_clears_every_cached_view() {
        let (store, engine, user, editor, write) = editor_setup();
        assert!(block_on(engine.check_permission(user, &code("article:write"))).unwrap());
        block_on(engine.get_user_permissions(user)).unwrap();
        block_on(engine.get_role_permissions(editor)).unwrap();

        block_on(engine.update_permission(
            write,
            PermissionUpdate {
                status: Some(Status::Disabled),
                ..PermissionUpdate::default()
            },
        ))
        .unwrap();
        assert_eq!(block_on(engine.cache_stats()), CacheStats::default());

        let before = store.join_queries();
        assert!(!block_on(engine.check_permission(user, &code("article:write"))).unwrap());
        let granted = block_on(engine.get_user_permissions(user)).unwrap();
        assert!(granted.is_empty());
        let assigned = block_on(engine.get_role_permissions(editor)).unwrap();
        assert!(assigned.is_empty());
        assert_eq!(store.join_queries(), before + 3);
    }

    #[test]
    fn renamed_permission_code_takes_effect_at_once() {
        let (_, engine, user, _, write) = editor_setup();
        assert!(block_on(engine.check_permission(user, &code("article:write"))).unwrap());

        block_on(engine.update_permission(
            write,
            PermissionUpdate {
                code: Some(code("article:edit")),
                ..PermissionUpdate::default()
            },
        ))
        .unwrap();

        assert!(!block_on(engine.check_permission(user, &code("article:write"))).unwrap());
        assert!(block_on(engine.check_permission(user, &code("article:edit"))).unwrap());
    }

    #[test]
    fn deleted_permission_is_revoked_and_its_code_freed() {
        let (_, engine, user, editor, write) = editor_setup();
        assert!(block_on(engine.check_permission(user, &code("article:write"))).unwrap());

        block_on(engine.delete_permission(write)).unwrap();
        assert!(!block_on(engine.check_permission(user, &code("article:write"))).unwrap());
        let detail = block_on(engine.get_role_with_permissions(editor)).unwrap();
        assert!(detail.permissions.is_empty());

        let err = block_on(engine.delete_permission(write)).unwrap_err();
        assert!(matches!(err, Error::PermissionNotFound { .. }));
        let err = block_on(engine.get_permission(write)).unwrap_err();
        assert!(matches!(err, Error::PermissionNotFound { .. }));
        assert_ne!(permission(&engine, "article:write"), write);
    }

    #[test]
    fn cache_stats_should_reflect_warm_views() {
        let (_, engine, user, editor, _) = editor_setup();
        block_on(engine.check_permission(user, &code("article:write"))).unwrap();
        block_on(engine.get_role_permissions(editor)).unwrap();

        let stats = block_on(engine.cache_stats());
        assert_eq!(stats.permission_checks, 1);
        assert_eq!(stats.role_permissions, 1);

        assert_eq!(block_on(engine.invalidate_all_cache()), 2);
        assert_eq!(block_on(engine.cache_stats()), CacheStats::default());
    }
}
