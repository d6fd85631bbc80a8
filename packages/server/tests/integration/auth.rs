use serde_json::json;

use crate::common::{TestApp, routes};

fn signup_body(email: &str) -> serde_json::Value {
    json!({
        "name": "Asha Rao",
        "email": email,
        "password": "password123",
        "branch": "CSE",
        "semester": 3,
    })
}

mod signup {
    use super::*;

    #[tokio::test]
    async fn new_student_receives_a_token_and_student_permissions() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(routes::SIGNUP, &signup_body("asha@example.edu"))
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert!(res.body["token"].is_string());
        assert_eq!(res.body["user"]["email"], "asha@example.edu");
        assert_eq!(res.body["user"]["role"], "student");
        assert_eq!(res.body["user"]["account_status"], "active");
        assert!(res.body["user"].get("password").is_none());

        let permissions: Vec<&str> = res.body["permissions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p.as_str().unwrap())
            .collect();
        assert!(permissions.contains(&"resource:upload"));
        assert!(permissions.contains(&"resource:interact"));
        assert!(!permissions.contains(&"resource:moderate"));
    }

    #[tokio::test]
    async fn email_is_stored_lowercased_and_duplicates_conflict() {
        let app = TestApp::spawn().await;

        let first = app
            .post_without_token(routes::SIGNUP, &signup_body("Asha@Example.edu"))
            .await;
        assert_eq!(first.status, 201, "{}", first.text);
        assert_eq!(first.body["user"]["email"], "asha@example.edu");

        let second = app
            .post_without_token(routes::SIGNUP, &signup_body("asha@example.EDU"))
            .await;
        assert_eq!(second.status, 409);
        assert_eq!(second.code(), "EMAIL_TAKEN");
    }

    #[tokio::test]
    async fn rejects_short_passwords_and_bad_semesters() {
        let app = TestApp::spawn().await;

        let mut body = signup_body("asha@example.edu");
        body["password"] = json!("short");
        let res = app.post_without_token(routes::SIGNUP, &body).await;
        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");

        let mut body = signup_body("asha@example.edu");
        body["semester"] = json!(9);
        let res = app.post_without_token(routes::SIGNUP, &body).await;
        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn rejects_malformed_email() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(routes::SIGNUP, &signup_body("not-an-email"))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }
}

mod login {
    use super::*;

    #[tokio::test]
    async fn correct_credentials_return_a_token() {
        let app = TestApp::spawn().await;
        app.create_student("asha@example.edu").await;

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": " ASHA@example.edu ", "password": "password123"}),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["token"].is_string());
        assert_eq!(res.body["user"]["name"], "Test Student");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let app = TestApp::spawn().await;
        app.create_student("asha@example.edu").await;

        let wrong_password = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "asha@example.edu", "password": "password124"}),
            )
            .await;
        let unknown = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "nobody@example.edu", "password": "password123"}),
            )
            .await;

        assert_eq!(wrong_password.status, 401);
        assert_eq!(wrong_password.code(), "INVALID_CREDENTIALS");
        assert_eq!(unknown.status, 401);
        assert_eq!(unknown.body, wrong_password.body);
    }
}

mod me {
    use super::*;

    #[tokio::test]
    async fn returns_profile_and_permissions() {
        let app = TestApp::spawn().await;
        let (token, id) = app.create_student("asha@example.edu").await;

        let res = app.get_with_token(routes::ME, &token).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["user"]["id"], id);
        assert_eq!(res.body["bookmarks"], json!([]));
        assert_eq!(res.body["liked_resources"], json!([]));
        assert!(res.body["permissions"].as_array().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::ME).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.get_with_token(routes::ME, "not-a-jwt").await;

        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "TOKEN_INVALID");
    }
}

mod profile {
    use super::*;

    #[tokio::test]
    async fn updates_only_the_given_fields() {
        let app = TestApp::spawn().await;
        let (token, id) = app.create_student("asha@example.edu").await;

        let res = app
            .put_with_token(
                routes::PROFILE,
                &json!({"name": "  Asha R  ", "semester": 5}),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["id"], id);
        assert_eq!(res.body["name"], "Asha R");
        assert_eq!(res.body["semester"], 5);
        assert_eq!(res.body["branch"], "CSE");
        assert_eq!(res.body["email"], "asha@example.edu");

        let me = app.get_with_token(routes::ME, &token).await;
        assert_eq!(me.body["user"]["name"], "Asha R");
        assert_eq!(me.body["user"]["semester"], 5);
    }

    #[tokio::test]
    async fn empty_or_invalid_updates_are_rejected() {
        let app = TestApp::spawn().await;
        let (token, _) = app.create_student("asha@example.edu").await;

        for body in [json!({}), json!({"name": "A"}), json!({"semester": 0})] {
            let res = app.put_with_token(routes::PROFILE, &body, &token).await;
            assert_eq!(res.status, 400, "{body}: {}", res.text);
            assert_eq!(res.code(), "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn requires_a_valid_token() {
        let app = TestApp::spawn().await;

        let res = app
            .put_with_token(routes::PROFILE, &json!({"name": "Asha"}), "not-a-jwt")
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "TOKEN_INVALID");
    }
}

mod change_password {
    use super::*;

    #[tokio::test]
    async fn new_password_replaces_the_old_one() {
        let app = TestApp::spawn().await;
        let (token, _) = app.create_student("asha@example.edu").await;

        let res = app
            .put_with_token(
                routes::CHANGE_PASSWORD,
                &json!({"current_password": "password123", "new_password": "better-pass-456"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 204, "{}", res.text);

        let old = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "asha@example.edu", "password": "password123"}),
            )
            .await;
        assert_eq!(old.status, 401);
        assert_eq!(old.code(), "INVALID_CREDENTIALS");

        let new = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "asha@example.edu", "password": "better-pass-456"}),
            )
            .await;
        assert_eq!(new.status, 200, "{}", new.text);
    }

    #[tokio::test]
    async fn wrong_current_password_is_rejected() {
        let app = TestApp::spawn().await;
        let (token, _) = app.create_student("asha@example.edu").await;

        let res = app
            .put_with_token(
                routes::CHANGE_PASSWORD,
                &json!({"current_password": "not-my-password", "new_password": "better-pass-456"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "INVALID_CREDENTIALS");

        let login = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "asha@example.edu", "password": "password123"}),
            )
            .await;
        assert_eq!(login.status, 200, "{}", login.text);
    }

    #[tokio::test]
    async fn short_new_password_is_rejected() {
        let app = TestApp::spawn().await;
        let (token, _) = app.create_student("asha@example.edu").await;

        let res = app
            .put_with_token(
                routes::CHANGE_PASSWORD,
                &json!({"current_password": "password123", "new_password": "short"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }
}
