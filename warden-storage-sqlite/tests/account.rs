use sqlx::SqlitePool;
use warden_core::{
    AccountId, Avatar, Error, NewAccount, Role,
    error::{ErrorKind, StorageError},
    repositories::AccountRepository,
};
use warden_storage_sqlite::SqliteAccountRepository;

async fn setup() -> SqliteAccountRepository {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let repo = SqliteAccountRepository::new(pool);
    repo.migrate().await.unwrap();
    repo
}

fn new_account(email: &str) -> NewAccount {
    NewAccount::builder()
        .full_name("Grace Hopper")
        .email(email)
        .mobile_number("5551234567")
        .bio("Compilers")
        .role(Role::Teacher)
        .password_hash("$argon2id$stub")
        .avatar(Avatar {
            id: "avatars/g.png".to_string(),
            url: "https://files.example.com/avatars/g.png".to_string(),
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_create_and_find() {
    let repo = setup().await;
    let created = repo.create(new_account("Grace@Example.com")).await.unwrap();

    assert_eq!(created.email, "grace@example.com");
    assert_eq!(created.role, Role::Teacher);
    assert!(created.refresh_token_hash.is_none());

    let by_id = repo.find_by_id(&created.id).await.unwrap().unwrap();
    assert_eq!(by_id.email, created.email);
    assert_eq!(by_id.avatar, created.avatar);

    let by_email = repo.find_by_email("grace@example.com").await.unwrap().unwrap();
    assert_eq!(by_email.id, created.id);

    assert!(repo.exists(&created.id).await.unwrap());
    assert!(repo.find_by_email("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let repo = setup().await;
    repo.create(new_account("grace@example.com")).await.unwrap();

    let err = repo.create(new_account("grace@example.com")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, Error::Storage(StorageError::Conflict(_))));
}

#[tokio::test]
async fn test_set_password_hash_revokes_session() {
    let repo = setup().await;
    let account = repo.create(new_account("grace@example.com")).await.unwrap();
    repo.set_refresh_token_hash(&account.id, Some("old"))
        .await
        .unwrap();

    repo.set_password_hash(&account.id, "$argon2id$new")
        .await
        .unwrap();

    let stored = repo.find_by_id(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.password_hash, "$argon2id$new");
    assert!(stored.refresh_token_hash.is_none());
    assert!(stored.updated_at >= stored.created_at);
}

#[tokio::test]
async fn test_save_details_ignores_stale_session_and_credentials() {
    let repo = setup().await;
    let account = repo.create(new_account("grace@example.com")).await.unwrap();
    repo.set_refresh_token_hash(&account.id, Some("live"))
        .await
        .unwrap();

    let mut stale = repo.find_by_id(&account.id).await.unwrap().unwrap();
    repo.set_refresh_token_hash(&account.id, None).await.unwrap();

    stale.bio = "COBOL".to_string();
    stale.role = Role::Admin;
    stale.password_hash = "$argon2id$forged".to_string();
    let saved = repo.save_details(&stale).await.unwrap();

    assert_eq!(saved.bio, "COBOL");
    assert_eq!(saved.role, Role::Admin);
    assert_eq!(saved.password_hash, "$argon2id$stub");
    assert!(saved.refresh_token_hash.is_none());
}

#[tokio::test]
async fn test_set_avatar_only_touches_avatar() {
    let repo = setup().await;
    let account = repo.create(new_account("grace@example.com")).await.unwrap();
    repo.set_refresh_token_hash(&account.id, Some("live"))
        .await
        .unwrap();

    let avatar = Avatar {
        id: "avatars/h.png".to_string(),
        url: "https://files.example.com/avatars/h.png".to_string(),
    };
    let saved = repo.set_avatar(&account.id, &avatar).await.unwrap();

    assert_eq!(saved.avatar, avatar);
    assert_eq!(saved.bio, "Compilers");
    assert_eq!(saved.refresh_token_hash.as_deref(), Some("live"));
}

#[tokio::test]
async fn test_writes_to_missing_account_not_found() {
    let repo = setup().await;
    let mut account = repo.create(new_account("grace@example.com")).await.unwrap();
    repo.delete(&account.id).await.unwrap();

    account.bio = "gone".to_string();
    let err = repo.save_details(&account).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = repo.set_avatar(&account.id, &account.avatar).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = repo
        .set_password_hash(&account.id, "$argon2id$new")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = repo.delete(&account.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_swap_refresh_token_hash() {
    let repo = setup().await;
    let account = repo.create(new_account("grace@example.com")).await.unwrap();

    // nothing stored yet
    assert!(!repo
        .swap_refresh_token_hash(&account.id, "a", Some("b"))
        .await
        .unwrap());

    repo.set_refresh_token_hash(&account.id, Some("a"))
        .await
        .unwrap();
    assert!(repo
        .swap_refresh_token_hash(&account.id, "a", Some("b"))
        .await
        .unwrap());
    assert!(!repo
        .swap_refresh_token_hash(&account.id, "a", Some("c"))
        .await
        .unwrap());

    let stored = repo.find_by_id(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token_hash.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_migrate_is_idempotent_and_healthy() {
    let repo = setup().await;
    repo.migrate().await.unwrap();
    repo.health_check().await.unwrap();
    assert!(!repo.exists(&AccountId::new_random()).await.unwrap());
}
