//! Role-Based Access Control (RBAC) stored in the database
//!
//! Roles and permissions live in their own tables. Users get permissions
//! directly or through any of their roles.

use crate::user::Authenticatable;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use larix_orm::{Database, Migration, Migrator, ModelResult, Row, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const ROLES_TABLE: &str = "roles";
pub const PERMISSIONS_TABLE: &str = "permissions";
pub const ROLE_PERMISSIONS_TABLE: &str = "role_permissions";
pub const USER_ROLES_TABLE: &str = "user_roles";
pub const USER_PERMISSIONS_TABLE: &str = "user_permissions";

/// A named role, e.g. `admin`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

/// A named permission, e.g. `posts.delete`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

pub struct CreateRolesTable;

impl Migration for CreateRolesTable {
    fn name(&self) -> String {
        "0000_00_00_000100_create_roles_table".to_string()
    }

    fn up(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.create(ROLES_TABLE, |t| {
            t.id();
            t.string("name", 255).unique();
            t.string("display_name", 255).nullable();
            t.text("description").nullable();
            t.timestamps();
        })
    }

    fn down(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.drop_if_exists(ROLES_TABLE);
        Ok(())
    }
}

pub struct CreatePermissionsTable;

impl Migration for CreatePermissionsTable {
    fn name(&self) -> String {
        "0000_00_00_000200_create_permissions_table".to_string()
    }

    fn up(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.create(PERMISSIONS_TABLE, |t| {
            t.id();
            t.string("name", 255).unique();
            t.string("display_name", 255).nullable();
            t.text("description").nullable();
            t.timestamps();
        })
    }

    fn down(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.drop_if_exists(PERMISSIONS_TABLE);
        Ok(())
    }
}

pub struct CreateRolePermissionsTable;

impl Migration for CreateRolePermissionsTable {
    fn name(&self) -> String {
        "0000_00_00_000300_create_role_permissions_table".to_string()
    }

    fn up(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.create(ROLE_PERMISSIONS_TABLE, |t| {
            t.foreign_id("role_id").references("roles.id").cascade_on_delete();
            t.foreign_id("permission_id")
                .references("permissions.id")
                .cascade_on_delete();
            t.unique(&["role_id", "permission_id"], None);
        })
    }

    fn down(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.drop_if_exists(ROLE_PERMISSIONS_TABLE);
        Ok(())
    }
}

pub struct CreateUserRolesTable;

impl Migration for CreateUserRolesTable {
    fn name(&self) -> String {
        "0000_00_00_000400_create_user_roles_table".to_string()
    }

    fn up(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.create(USER_ROLES_TABLE, |t| {
            t.foreign_id("user_id");
            t.foreign_id("role_id").references("roles.id").cascade_on_delete();
            t.unique(&["user_id", "role_id"], None);
        })
    }

    fn down(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.drop_if_exists(USER_ROLES_TABLE);
        Ok(())
    }
}

pub struct CreateUserPermissionsTable;

impl Migration for CreateUserPermissionsTable {
    fn name(&self) -> String {
        "0000_00_00_000500_create_user_permissions_table".to_string()
    }

    fn up(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.create(USER_PERMISSIONS_TABLE, |t| {
            t.foreign_id("user_id");
            t.foreign_id("permission_id")
                .references("permissions.id")
                .cascade_on_delete();
            t.unique(&["user_id", "permission_id"], None);
        })
    }

    fn down(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.drop_if_exists(USER_PERMISSIONS_TABLE);
        Ok(())
    }
}

/// Add the five RBAC migrations to a migrator
pub fn register_migrations(migrator: &mut Migrator) {
    migrator
        .add(CreateRolesTable)
        .add(CreatePermissionsTable)
        .add(CreateRolePermissionsTable)
        .add(CreateUserRolesTable)
        .add(CreateUserPermissionsTable);
}

/// Integer-looking user ids are stored as integers
fn user_key(user_id: &str) -> Value {
    match user_id.parse::<i64>() {
        Ok(id) => Value::from(id),
        Err(_) => Value::from(user_id),
    }
}

fn row(pairs: &[(&str, Value)]) -> Row {
    let mut row = Map::new();
    for (column, value) in pairs {
        if !value.is_null() {
            row.insert(column.to_string(), value.clone());
        }
    }
    row
}

fn names(values: Vec<Value>) -> Vec<String> {
    let set: BTreeSet<String> = values
        .into_iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
    set.into_iter().collect()
}

#[derive(Debug, Clone)]
pub struct RbacManager {
    db: Database,
}

impl RbacManager {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    pub async fn create_role(
        &self,
        name: &str,
        display_name: Option<&str>,
        description: Option<&str>,
    ) -> AuthResult<Role> {
        if self.find_role(name).await?.is_some() {
            return Err(AuthError::generic_error(format!("Role '{}' already exists", name)));
        }
        let id = self
            .db
            .table(ROLES_TABLE)
            .insert_get_id(
                &self.db,
                row(&[
                    ("name", Value::from(name)),
                    ("display_name", display_name.map(Value::from).unwrap_or(Value::Null)),
                    ("description", description.map(Value::from).unwrap_or(Value::Null)),
                ]),
            )
            .await?;
        tracing::info!(role = %name, "Role created");
        Ok(Role {
            id,
            name: name.to_string(),
            display_name: display_name.map(String::from),
            description: description.map(String::from),
        })
    }

    pub async fn create_permission(
        &self,
        name: &str,
        display_name: Option<&str>,
        description: Option<&str>,
    ) -> AuthResult<Permission> {
        if self.find_permission(name).await?.is_some() {
            return Err(AuthError::generic_error(format!(
                "Permission '{}' already exists",
                name
            )));
        }
        let id = self
            .db
            .table(PERMISSIONS_TABLE)
            .insert_get_id(
                &self.db,
                row(&[
                    ("name", Value::from(name)),
                    ("display_name", display_name.map(Value::from).unwrap_or(Value::Null)),
                    ("description", description.map(Value::from).unwrap_or(Value::Null)),
                ]),
            )
            .await?;
        Ok(Permission {
            id,
            name: name.to_string(),
            display_name: display_name.map(String::from),
            description: description.map(String::from),
        })
    }

    pub async fn find_role(&self, name: &str) -> AuthResult<Option<Role>> {
        let found = self
            .db
            .table(ROLES_TABLE)
            .select(&["id", "name", "display_name", "description"])
            .where_eq("name", name)
            .first(&self.db)
            .await?;
        Ok(match found {
            Some(row) => Some(serde_json::from_value(Value::Object(row))?),
            None => None,
        })
    }

    pub async fn find_permission(&self, name: &str) -> AuthResult<Option<Permission>> {
        let found = self
            .db
            .table(PERMISSIONS_TABLE)
            .select(&["id", "name", "display_name", "description"])
            .where_eq("name", name)
            .first(&self.db)
            .await?;
        Ok(match found {
            Some(row) => Some(serde_json::from_value(Value::Object(row))?),
            None => None,
        })
    }

    pub async fn roles(&self) -> AuthResult<Vec<String>> {
        Ok(names(self.db.table(ROLES_TABLE).pluck(&self.db, "name").await?))
    }

    async fn role_id(&self, name: &str) -> AuthResult<i64> {
        self.find_role(name)
            .await?
            .map(|role| role.id)
            .ok_or_else(|| AuthError::role_not_found(name))
    }

    async fn permission_id(&self, name: &str) -> AuthResult<i64> {
        self.find_permission(name)
            .await?
            .map(|permission| permission.id)
            .ok_or_else(|| AuthError::permission_not_found(name))
    }

    /// Insert a pivot row unless it is already there
    async fn attach(&self, table: &str, pairs: [(&str, Value); 2]) -> AuthResult<bool> {
        let mut query = self.db.table(table);
        for (column, value) in pairs.iter() {
            query = query.where_eq(column, value.clone());
        }
        if query.exists(&self.db).await? {
            return Ok(false);
        }
        self.db.table(table).insert(&self.db, row(&pairs)).await?;
        Ok(true)
    }

    async fn detach(&self, table: &str, pairs: [(&str, Value); 2]) -> AuthResult<bool> {
        let mut query = self.db.table(table);
        for (column, value) in pairs {
            query = query.where_eq(column, value);
        }
        Ok(query.delete(&self.db).await? > 0)
    }

    pub async fn give_permission_to_role(&self, role: &str, permission: &str) -> AuthResult<()> {
        let role_id = self.role_id(role).await?;
        let permission_id = self.permission_id(permission).await?;
        self.attach(
            ROLE_PERMISSIONS_TABLE,
            [("role_id", Value::from(role_id)), ("permission_id", Value::from(permission_id))],
        )
        .await?;
        Ok(())
    }

    pub async fn revoke_permission_from_role(&self, role: &str, permission: &str) -> AuthResult<bool> {
        let role_id = self.role_id(role).await?;
        let permission_id = self.permission_id(permission).await?;
        self.detach(
            ROLE_PERMISSIONS_TABLE,
            [("role_id", Value::from(role_id)), ("permission_id", Value::from(permission_id))],
        )
        .await
    }

    pub async fn role_permissions(&self, role: &str) -> AuthResult<Vec<String>> {
        let role_id = self.role_id(role).await?;
        let values = self
            .db
            .table(ROLE_PERMISSIONS_TABLE)
            .join(PERMISSIONS_TABLE, "permissions.id", "=", "role_permissions.permission_id")
            .where_eq("role_permissions.role_id", role_id)
            .pluck(&self.db, "permissions.name")
            .await?;
        Ok(names(values))
    }

    /// Assigning a role the user already has is a no-op
    pub async fn assign_role(&self, user_id: &str, role: &str) -> AuthResult<()> {
        let role_id = self.role_id(role).await?;
        let added = self
            .attach(
                USER_ROLES_TABLE,
                [("user_id", user_key(user_id)), ("role_id", Value::from(role_id))],
            )
            .await?;
        if added {
            tracing::info!(user_id = %user_id, role = %role, "Role assigned");
        }
        Ok(())
    }

    pub async fn remove_role(&self, user_id: &str, role: &str) -> AuthResult<bool> {
        let role_id = self.role_id(role).await?;
        self.detach(
            USER_ROLES_TABLE,
            [("user_id", user_key(user_id)), ("role_id", Value::from(role_id))],
        )
        .await
    }

    /// Replace the user's roles with exactly `roles`
    pub async fn sync_roles(&self, user_id: &str, roles: &[&str]) -> AuthResult<()> {
        let mut role_ids = Vec::with_capacity(roles.len());
        for role in roles {
            role_ids.push(self.role_id(role).await?);
        }
        role_ids.sort_unstable();
        role_ids.dedup();

        let tx = self.db.begin().await?;
        tx.table(USER_ROLES_TABLE)
            .where_eq("user_id", user_key(user_id))
            .delete(&tx)
            .await?;
        if !role_ids.is_empty() {
            let rows = role_ids
                .iter()
                .map(|id| row(&[("user_id", user_key(user_id)), ("role_id", Value::from(*id))]))
                .collect();
            tx.table(USER_ROLES_TABLE).insert_many(&tx, rows).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn give_permission_to(&self, user_id: &str, permission: &str) -> AuthResult<()> {
        let permission_id = self.permission_id(permission).await?;
        self.attach(
            USER_PERMISSIONS_TABLE,
            [("user_id", user_key(user_id)), ("permission_id", Value::from(permission_id))],
        )
        .await?;
        Ok(())
    }

    pub async fn revoke_permission_to(&self, user_id: &str, permission: &str) -> AuthResult<bool> {
        let permission_id = self.permission_id(permission).await?;
        self.detach(
            USER_PERMISSIONS_TABLE,
            [("user_id", user_key(user_id)), ("permission_id", Value::from(permission_id))],
        )
        .await
    }

    /// Role names, sorted
    pub async fn user_roles(&self, user_id: &str) -> AuthResult<Vec<String>> {
        let values = self
            .db
            .table(USER_ROLES_TABLE)
            .join(ROLES_TABLE, "roles.id", "=", "user_roles.role_id")
            .where_eq("user_roles.user_id", user_key(user_id))
            .pluck(&self.db, "roles.name")
            .await?;
        Ok(names(values))
    }

    pub async fn has_role(&self, user_id: &str, role: &str) -> AuthResult<bool> {
        Ok(self.user_roles(user_id).await?.iter().any(|r| r == role))
    }

    pub async fn has_any_role(&self, user_id: &str, roles: &[&str]) -> AuthResult<bool> {
        let held = self.user_roles(user_id).await?;
        Ok(roles.iter().any(|role| held.iter().any(|h| h == role)))
    }

    pub async fn has_all_roles(&self, user_id: &str, roles: &[&str]) -> AuthResult<bool> {
        let held = self.user_roles(user_id).await?;
        Ok(roles.iter().all(|role| held.iter().any(|h| h == role)))
    }

    /// Direct permissions plus those granted through roles, deduplicated and sorted
    pub async fn user_permissions(&self, user_id: &str) -> AuthResult<Vec<String>> {
        let key = user_key(user_id);
        let mut values = self
            .db
            .table(USER_PERMISSIONS_TABLE)
            .join(PERMISSIONS_TABLE, "permissions.id", "=", "user_permissions.permission_id")
            .where_eq("user_permissions.user_id", key.clone())
            .pluck(&self.db, "permissions.name")
            .await?;
        let via_roles = self
            .db
            .table(USER_ROLES_TABLE)
            .join(ROLE_PERMISSIONS_TABLE, "role_permissions.role_id", "=", "user_roles.role_id")
            .join(PERMISSIONS_TABLE, "permissions.id", "=", "role_permissions.permission_id")
            .where_eq("user_roles.user_id", key)
            .pluck(&self.db, "permissions.name")
            .await?;
        values.extend(via_roles);
        Ok(names(values))
    }

    pub async fn has_permission(&self, user_id: &str, permission: &str) -> AuthResult<bool> {
        Ok(self
            .user_permissions(user_id)
            .await?
            .iter()
            .any(|p| p == permission))
    }
}

/// Role and permission checks on any authenticatable user
#[async_trait]
pub trait HasRoles: Authenticatable {
    async fn has_role(&self, rbac: &RbacManager, role: &str) -> AuthResult<bool> {
        rbac.has_role(&self.auth_identifier(), role).await
    }

    async fn has_any_role(&self, rbac: &RbacManager, roles: &[&str]) -> AuthResult<bool> {
        rbac.has_any_role(&self.auth_identifier(), roles).await
    }

    async fn has_all_roles(&self, rbac: &RbacManager, roles: &[&str]) -> AuthResult<bool> {
        rbac.has_all_roles(&self.auth_identifier(), roles).await
    }

    async fn has_permission(&self, rbac: &RbacManager, permission: &str) -> AuthResult<bool> {
        rbac.has_permission(&self.auth_identifier(), permission).await
    }

    async fn assign_role(&self, rbac: &RbacManager, role: &str) -> AuthResult<()> {
        rbac.assign_role(&self.auth_identifier(), role).await
    }

    async fn remove_role(&self, rbac: &RbacManager, role: &str) -> AuthResult<bool> {
        rbac.remove_role(&self.auth_identifier(), role).await
    }

    async fn give_permission(&self, rbac: &RbacManager, permission: &str) -> AuthResult<()> {
        rbac.give_permission_to(&self.auth_identifier(), permission).await
    }

    async fn sync_roles(&self, rbac: &RbacManager, roles: &[&str]) -> AuthResult<()> {
        rbac.sync_roles(&self.auth_identifier(), roles).await
    }

    async fn role_names(&self, rbac: &RbacManager) -> AuthResult<Vec<String>> {
        rbac.user_roles(&self.auth_identifier()).await
    }

    async fn all_permissions(&self, rbac: &RbacManager) -> AuthResult<Vec<String>> {
        rbac.user_permissions(&self.auth_identifier()).await
    }
}

impl<U: Authenticatable> HasRoles for U {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::GenericUser;
    use larix_orm::MigrateOptions;
    use serde_json::json;

    async fn rbac() -> RbacManager {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let mut migrator = Migrator::new(db.clone());
        register_migrations(&mut migrator);
        migrator.run(MigrateOptions::default()).await.unwrap();
        RbacManager::new(&db)
    }

    async fn seeded() -> RbacManager {
        let rbac = rbac().await;
        rbac.create_role("admin", Some("Administrator"), None).await.unwrap();
        rbac.create_role("editor", None, None).await.unwrap();
        for permission in ["posts.create", "posts.delete", "users.manage"] {
            rbac.create_permission(permission, None, None).await.unwrap();
        }
        rbac.give_permission_to_role("editor", "posts.create").await.unwrap();
        rbac.give_permission_to_role("admin", "posts.delete").await.unwrap();
        rbac.give_permission_to_role("admin", "users.manage").await.unwrap();
        rbac
    }

    #[tokio::test]
    async fn test_roles_and_permissions_tables() {
        let rbac = seeded().await;
        let admin = rbac.find_role("admin").await.unwrap().unwrap();
        assert_eq!(admin.display_name.as_deref(), Some("Administrator"));
        assert!(rbac.find_role("ghost").await.unwrap().is_none());
        assert_eq!(rbac.roles().await.unwrap(), vec!["admin", "editor"]);
        assert_eq!(
            rbac.role_permissions("admin").await.unwrap(),
            vec!["posts.delete", "users.manage"]
        );

        assert!(rbac.create_role("admin", None, None).await.is_err());
        assert!(rbac.revoke_permission_from_role("admin", "users.manage").await.unwrap());
        assert!(!rbac.revoke_permission_from_role("admin", "users.manage").await.unwrap());
        assert!(matches!(
            rbac.give_permission_to_role("admin", "nope").await,
            Err(AuthError::PermissionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_assign_roles() {
        let rbac = seeded().await;
        rbac.assign_role("1", "editor").await.unwrap();
        rbac.assign_role("1", "editor").await.unwrap();
        assert_eq!(rbac.user_roles("1").await.unwrap(), vec!["editor"]);

        assert!(matches!(
            rbac.assign_role("1", "ghost").await,
            Err(AuthError::RoleNotFound { .. })
        ));

        assert!(rbac.has_role("1", "editor").await.unwrap());
        assert!(rbac.has_any_role("1", &["admin", "editor"]).await.unwrap());
        assert!(!rbac.has_all_roles("1", &["admin", "editor"]).await.unwrap());

        rbac.sync_roles("1", &["admin", "editor"]).await.unwrap();
        assert!(rbac.has_all_roles("1", &["admin", "editor"]).await.unwrap());
        rbac.sync_roles("1", &["admin"]).await.unwrap();
        assert_eq!(rbac.user_roles("1").await.unwrap(), vec!["admin"]);

        assert!(rbac.remove_role("1", "admin").await.unwrap());
        assert!(rbac.user_roles("1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permissions_direct_and_via_roles() {
        let rbac = seeded().await;
        rbac.assign_role("2", "editor").await.unwrap();
        rbac.give_permission_to("2", "users.manage").await.unwrap();

        assert!(rbac.has_permission("2", "posts.create").await.unwrap());
        assert!(rbac.has_permission("2", "users.manage").await.unwrap());
        assert!(!rbac.has_permission("2", "posts.delete").await.unwrap());

        rbac.assign_role("2", "admin").await.unwrap();
        // users.manage arrives both directly and through admin
        assert_eq!(
            rbac.user_permissions("2").await.unwrap(),
            vec!["posts.create", "posts.delete", "users.manage"]
        );

        assert!(rbac.revoke_permission_to("2", "users.manage").await.unwrap());
        assert!(rbac.has_permission("2", "users.manage").await.unwrap());
    }

    #[tokio::test]
    async fn test_has_roles_trait() {
        let rbac = seeded().await;
        let user: GenericUser = serde_json::from_value(json!({"id": 3, "password": ""})).unwrap();

        user.assign_role(&rbac, "editor").await.unwrap();
        assert!(HasRoles::has_role(&user, &rbac, "editor").await.unwrap());
        assert!(user.has_permission(&rbac, "posts.create").await.unwrap());
        assert_eq!(user.role_names(&rbac).await.unwrap(), vec!["editor"]);
        assert_eq!(user.all_permissions(&rbac).await.unwrap(), vec!["posts.create"]);
    }
}
