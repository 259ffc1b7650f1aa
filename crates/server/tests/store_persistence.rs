use chat_common::{IdentityId, Role};
use server::auth::NewUser;
use server::config::{AppState, ChatServerConfig};
use tempfile::tempdir;
use tokio_test::assert_ok;

fn test_config(dir: &std::path::Path) -> ChatServerConfig {
    let mut config = ChatServerConfig::with_base_dir(dir);
    config.password_cost = 4;
    config
}

async fn add_user(state: &AppState, email: &str, role: Role) -> IdentityId {
    state
        .auth
        .signup(NewUser {
            email: email.into(),
            full_name: email.split('@').next().unwrap_or(email).into(),
            password: "secret123".into(),
            role,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn messages_survive_restart() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());

    let (learner, operator, sent) = {
        // 1. Write through one server instance
        let state = AppState::new(&config).await.unwrap();
        let learner = add_user(&state, "lena@course.test", Role::Learner).await;
        let operator = add_user(&state, "otto@course.test", Role::Operator).await;

        let first = state.store.append(&learner, &operator, "Hello").await.unwrap();
        let second = state.store.append(&operator, &learner, "Hi!").await.unwrap();
        (learner, operator, vec![first, second])
        // state is dropped here
    };

    assert!(config.db_path.exists(), "Database file should exist");

    // 2. A fresh instance reads the same conversation back
    let state = AppState::new(&config).await.unwrap();
    let history = state.store.history(&operator, &learner).await.unwrap();
    assert_eq!(history, sent);

    // 3. Ids keep increasing after restart
    let third = state.store.append(&learner, &operator, "Thanks").await.unwrap();
    assert!(third.id > sent[1].id);
}

#[tokio::test]
async fn sessions_survive_restart() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());

    let token = {
        let state = AppState::new(&config).await.unwrap();
        add_user(&state, "lena@course.test", Role::Learner).await;
        let (_, session) = state
            .auth
            .login("lena@course.test", "secret123")
            .await
            .unwrap();
        session.token
    };

    let state = AppState::new(&config).await.unwrap();
    let identity = assert_ok!(state.auth.validate_session(&token).await);
    assert_eq!(identity.email, "lena@course.test");
    assert_eq!(identity.role, Role::Learner);
}
