//! Account lifecycle: signup, profile reads, detail and avatar updates,
//! deletion.
//!
//! Avatar replacement is upload, then commit, then delete the old file. If
//! the commit fails the new upload is removed again. Failures of these
//! compensating removals are logged and never replace the original error.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    Error,
    account::{Account, AccountId, AccountProfile, Avatar, NewAccount, Role},
    crypto::hash_password,
    error::{
        AuthError, AuthorizationError, StorageError, ValidationError,
        utilities::{RequiredFieldExt, RequiredTextExt},
    },
    repositories::{AccountRepository, FileStorage, Upload},
    validation::{
        normalize_email, validate_bio, validate_email, validate_full_name,
        validate_mobile_number, validate_password,
    },
};

const AVATAR_FOLDER: &str = "avatars";

/// Signup form fields. The avatar travels separately as an [`Upload`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signup {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub mobile_number: Option<String>,
    pub bio: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

/// Partial update of profile details
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsUpdate {
    pub full_name: Option<String>,
    pub mobile_number: Option<String>,
    pub bio: Option<String>,
    pub role: Option<String>,
}

impl DetailsUpdate {
    fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.mobile_number.is_none()
            && self.bio.is_none()
            && self.role.is_none()
    }
}

pub struct AccountService<A: AccountRepository, F: FileStorage> {
    accounts: Arc<A>,
    files: Arc<F>,
}

impl<A: AccountRepository, F: FileStorage> AccountService<A, F> {
    pub fn new(accounts: Arc<A>, files: Arc<F>) -> Self {
        Self { accounts, files }
    }

    /// Register a new account. Every field and the avatar are required.
    pub async fn signup(
        &self,
        form: Signup,
        avatar: Option<Upload>,
    ) -> Result<AccountProfile, Error> {
        let full_name = form.full_name.require_text("Full name")?;
        let email = normalize_email(&form.email.require_text("Email")?);
        let mobile_number = form.mobile_number.require_text("Mobile number")?;
        let bio = form.bio.require_text("Bio")?;
        let role: Role = form.role.require_text("Role")?.parse()?;
        let password = form.password.require_field("Password")?;
        let avatar = avatar.require_field("Avatar")?;

        validate_full_name(&full_name)?;
        validate_email(&email)?;
        validate_mobile_number(&mobile_number)?;
        validate_bio(&bio)?;
        validate_password(&password)?;
        ensure_image(&avatar)?;

        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(StorageError::Conflict(
                "Account with this email already exists".to_string(),
            )
            .into());
        }

        let password_hash = hash_password(&password).await?;
        let stored: Avatar = self.files.store(avatar, AVATAR_FOLDER).await?.into();

        let new_account = NewAccount::builder()
            .full_name(full_name)
            .email(email)
            .mobile_number(mobile_number)
            .bio(bio)
            .role(role)
            .password_hash(password_hash)
            .avatar(stored.clone())
            .build()?;

        match self.accounts.create(new_account).await {
            Ok(account) => {
                tracing::info!(account_id = %account.id, role = %account.role, "Account created");
                Ok(account.profile())
            }
            Err(e) => {
                self.discard_file(&stored.id, "signup rollback").await;
                Err(e)
            }
        }
    }

    pub async fn profile(&self, account_id: &AccountId) -> Result<AccountProfile, Error> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .map(|account| account.profile())
            .ok_or_else(|| StorageError::NotFound.into())
    }

    /// Public profiles of every account, oldest first.
    pub async fn list_profiles(&self) -> Result<Vec<AccountProfile>, Error> {
        let accounts = self.accounts.list().await?;
        Ok(accounts.iter().map(Account::profile).collect())
    }

    /// Update the actor's own details.
    ///
    /// A role change is accepted only from an actor whose stored role is admin.
    pub async fn update_details(
        &self,
        actor_id: &AccountId,
        update: DetailsUpdate,
    ) -> Result<AccountProfile, Error> {
        if update.is_empty() {
            return Err(
                ValidationError::MissingField("At least one field is required".to_string()).into(),
            );
        }

        let mut account = self
            .accounts
            .find_by_id(actor_id)
            .await?
            .ok_or(AuthError::AccountMissing)?;

        if let Some(full_name) = update.full_name {
            validate_full_name(&full_name)?;
            account.full_name = full_name.trim().to_string();
        }
        if let Some(mobile_number) = update.mobile_number {
            validate_mobile_number(&mobile_number)?;
            account.mobile_number = mobile_number.trim().to_string();
        }
        if let Some(bio) = update.bio {
            validate_bio(&bio)?;
            account.bio = bio;
        }
        if let Some(role) = update.role {
            let role: Role = role.parse()?;
            if role != account.role && !account.is_admin() {
                return Err(AuthorizationError::RoleNotPermitted(role.to_string()).into());
            }
            account.role = role;
        }

        let saved = self.accounts.save_details(&account).await?;
        Ok(saved.profile())
    }

    /// Replace the actor's avatar.
    pub async fn update_avatar(
        &self,
        actor_id: &AccountId,
        upload: Option<Upload>,
    ) -> Result<AccountProfile, Error> {
        let upload = upload.require_field("Avatar")?;
        ensure_image(&upload)?;

        let previous = self
            .accounts
            .find_by_id(actor_id)
            .await?
            .ok_or(AuthError::AccountMissing)?
            .avatar;

        let stored: Avatar = self.files.store(upload, AVATAR_FOLDER).await?.into();

        let saved = match self.accounts.set_avatar(actor_id, &stored).await {
            Ok(saved) => saved,
            Err(e) => {
                self.discard_file(&stored.id, "avatar rollback").await;
                return Err(e);
            }
        };

        self.discard_file(&previous.id, "old avatar cleanup").await;
        Ok(saved.profile())
    }

    /// Delete `target_id` on behalf of `actor_id`.
    ///
    /// Admins may delete any account but their own; everyone else may
    /// delete only themselves.
    pub async fn delete_account(
        &self,
        actor_id: &AccountId,
        target_id: &str,
    ) -> Result<(), Error> {
        let target_id = AccountId::parse(target_id)?;
        let actor = self
            .accounts
            .find_by_id(actor_id)
            .await?
            .ok_or(AuthError::AccountMissing)?;

        let is_self = actor.id == target_id;
        if actor.is_admin() && is_self {
            return Err(ValidationError::InvalidField(
                "Admins cannot delete their own account".to_string(),
            )
            .into());
        }
        if !actor.is_admin() && !is_self {
            return Err(AuthorizationError::Forbidden(format!(
                "{actor_id} may not delete {target_id}"
            ))
            .into());
        }

        let target = self
            .accounts
            .find_by_id(&target_id)
            .await?
            .ok_or(StorageError::NotFound)?;

        self.discard_file(&target.avatar.id, "account deletion").await;
        self.accounts.delete(&target.id).await?;

        tracing::info!(actor_id = %actor_id, account_id = %target.id, "Account deleted");
        Ok(())
    }

    async fn discard_file(&self, file_id: &str, reason: &str) {
        if let Err(e) = self.files.remove(file_id).await {
            tracing::warn!(
                file_id = %file_id,
                reason = reason,
                error = %e,
                "Failed to remove stored file"
            );
        }
    }
}

fn ensure_image(upload: &Upload) -> Result<(), ValidationError> {
    if upload.bytes.is_empty() {
        return Err(ValidationError::MissingField(
            "Avatar is required".to_string(),
        ));
    }
    if !upload.is_image() {
        return Err(ValidationError::InvalidField(
            "Avatar must be an image".to_string(),
        ));
    }
    Ok(())
}
