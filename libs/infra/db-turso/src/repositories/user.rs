// [libs/infra/db-turso/src/repositories/user.rs]
/*!
 * =================================================================
 * APARATO: USER & MEMBERSHIP REPOSITORY (V2.2 - DUAL AGGREGATE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PRINCIPALES HUMANOS Y RELACIÓN TERNARIA DE ROLES
 *
 * # Logic:
 * El email de usuario y el par (usuario, tenant) portan índices únicos;
 * las colisiones emergen como DbError::UniqueViolation y el estrato
 * API las traduce a CONFLICT.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::Utc;
use helios_domain_models::{Membership, Role, User, UserStatus};
use libsql::{params, Row};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct UserRepository {
    database_client: TursoClient,
}

const USER_COLUMNS: &str = "id, email, name, password_hash, status, created_at, updated_at";

fn map_user_row(row: &Row) -> Result<User, DbError> {
    let status_raw: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        status: mappers::decode_enum(&status_raw, UserStatus::parse, "UserStatus")?,
        created_at: mappers::get_timestamp(row, 5)?,
        updated_at: mappers::get_timestamp(row, 6)?,
    })
}

fn map_membership_row(row: &Row) -> Result<Membership, DbError> {
    let role_raw: String = row.get(3)?;
    Ok(Membership {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tenant_id: row.get(2)?,
        role: mappers::decode_enum(&role_raw, Role::parse, "Role")?,
        created_at: mappers::get_timestamp(row, 4)?,
    })
}

impl UserRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, password_hash))]
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
        status: UserStatus,
    ) -> Result<User, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_lowercase(),
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            status,
            created_at: now,
            updated_at: now,
        };

        connection
            .execute(
                "INSERT INTO users (id, email, name, password_hash, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id.clone(),
                    user.email.clone(),
                    user.name.clone(),
                    user.password_hash.clone(),
                    user.status.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        info!("👤 [USERS]: Principal {} registered.", user.id);
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email.to_lowercase()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_user_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![user_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_user_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn create_membership(
        &self,
        user_id: &str,
        tenant_id: &str,
        role: Role,
    ) -> Result<Membership, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let membership = Membership {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            role,
            created_at: now,
        };

        connection
            .execute(
                "INSERT INTO memberships (id, user_id, tenant_id, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    membership.id.clone(),
                    membership.user_id.clone(),
                    membership.tenant_id.clone(),
                    membership.role.as_str(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        Ok(membership)
    }

    /// Cambia el rol de una membresía existente; NotFound si el par no existe.
    #[instrument(skip(self))]
    pub async fn update_membership_role(
        &self,
        user_id: &str,
        tenant_id: &str,
        role: Role,
    ) -> Result<Membership, DbError> {
        let connection = self.database_client.get_connection()?;

        let updated_rows = connection
            .execute(
                "UPDATE memberships SET role = ?3 WHERE user_id = ?1 AND tenant_id = ?2",
                params![user_id, tenant_id, role.as_str()],
            )
            .await?;

        if updated_rows == 0 {
            return Err(DbError::NotFound);
        }

        let mut rows = connection
            .query(
                "SELECT id, user_id, tenant_id, role, created_at FROM memberships
                 WHERE user_id = ?1 AND tenant_id = ?2",
                params![user_id, tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => map_membership_row(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn memberships_for_user(&self, user_id: &str) -> Result<Vec<Membership>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, user_id, tenant_id, role, created_at FROM memberships
                 WHERE user_id = ?1 ORDER BY created_at ASC",
                params![user_id],
            )
            .await?;

        let mut memberships = Vec::new();
        while let Some(row) = rows.next().await? {
            memberships.push(map_membership_row(&row)?);
        }
        Ok(memberships)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::tenant::TenantRepository;
    use helios_domain_models::TenantType;

    async fn test_client() -> (TursoClient, tempfile::TempDir) {
        let scratch_directory = tempfile::tempdir().expect("scratch dir");
        let database_path = scratch_directory.path().join("proving.db");
        let client = TursoClient::connect(database_path.to_str().unwrap(), None)
            .await
            .expect("ledger ignition");
        (client, scratch_directory)
    }

    #[tokio::test]
    async fn certify_duplicate_email_is_unique_violation() {
        let (client, _guard) = test_client().await;
        let repository = UserRepository::new(client);

        repository
            .create_user("dup@helios.example", "First", "hash-a", UserStatus::Active)
            .await
            .unwrap();

        let collision = repository
            .create_user("dup@helios.example", "Second", "hash-b", UserStatus::Active)
            .await;

        assert!(matches!(collision, Err(DbError::UniqueViolation(_))));
    }

    #[tokio::test]
    async fn certify_membership_pair_is_unique_and_role_updates() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let users = UserRepository::new(client);

        let tenant = tenants.create("Acme Solar", TenantType::Installer).await.unwrap();
        let user = users
            .create_user("member@helios.example", "Member", "hash", UserStatus::Active)
            .await
            .unwrap();

        users
            .create_membership(&user.id, &tenant.id, Role::Installer)
            .await
            .unwrap();

        let duplicate = users
            .create_membership(&user.id, &tenant.id, Role::EndUser)
            .await;
        assert!(matches!(duplicate, Err(DbError::UniqueViolation(_))));

        let promoted = users
            .update_membership_role(&user.id, &tenant.id, Role::TenantAdmin)
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::TenantAdmin);

        let loaded = users.memberships_for_user(&user.id).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].role, Role::TenantAdmin);
    }
}
