use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

use server::entity::{blob_chunk, blob_file, bookmark, resource, resource_like};

use crate::common::{TestApp, routes, sample_bytes};

mod moderation {
    use super::*;

    #[tokio::test]
    async fn students_cannot_use_admin_routes() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;

        let stats = app.get_with_token(routes::ADMIN_STATS, &student).await;
        let users = app.get_with_token(routes::ADMIN_USERS, &student).await;

        assert_eq!(stats.status, 403);
        assert_eq!(stats.code(), "PERMISSION_DENIED");
        assert_eq!(users.status, 403);
    }

    #[tokio::test]
    async fn approve_and_reject_update_status_and_stats() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;

        let a = app.upload_resource(&student, "Keep", sample_bytes(64)).await;
        let b = app.upload_resource(&student, "Drop", sample_bytes(64)).await;
        app.upload_resource(&student, "Wait", sample_bytes(64)).await;
        let (a, b) = (a["id"].as_i64().unwrap() as i32, b["id"].as_i64().unwrap() as i32);

        let pending = app.get_with_token(routes::ADMIN_RESOURCES, &admin).await;
        assert_eq!(pending.status, 200, "{}", pending.text);
        assert_eq!(pending.body["count"], 3);

        let res = app.put_with_token(&routes::approve(a), &json!({}), &admin).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "approved");

        let res = app
            .put_with_token(&routes::reject(b), &json!({"reason": "  "}), &admin)
            .await;
        assert_eq!(res.status, 400);

        let res = app
            .put_with_token(&routes::reject(b), &json!({"reason": "Blurry scan"}), &admin)
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "rejected");
        assert_eq!(res.body["rejection_reason"], "Blurry scan");

        let stats = app.get_with_token(routes::ADMIN_STATS, &admin).await;
        assert_eq!(stats.status, 200, "{}", stats.text);
        assert_eq!(
            stats.body,
            json!({
                "total_students": 1,
                "total_uploads": 3,
                "pending": 1,
                "approved": 1,
                "rejected": 1,
            })
        );

        let rejected = app
            .get_with_token(&format!("{}?status=rejected", routes::ADMIN_RESOURCES), &admin)
            .await;
        assert_eq!(rejected.body["count"], 1);
        assert_eq!(rejected.body["data"][0]["id"], b);

        let bad = app
            .get_with_token(&format!("{}?status=archived", routes::ADMIN_RESOURCES), &admin)
            .await;
        assert_eq!(bad.status, 400);
    }

    #[tokio::test]
    async fn deleting_a_resource_removes_interactions_and_file() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;
        let (id, file_id) = app.approved_resource(&student, &admin, "Gone").await;

        app.post_with_token(&routes::like(id), &json!({}), &student).await;
        app.post_with_token(&routes::bookmark(id), &json!({}), &student).await;

        let res = app.delete_with_token(&routes::admin_resource(id), &admin).await;
        assert_eq!(res.status, 204, "{}", res.text);

        assert_eq!(app.get_without_token(&routes::resource(id)).await.status, 404);
        assert_eq!(app.get_without_token(&routes::file(&file_id)).await.status, 404);
        assert_eq!(resource_like::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(bookmark::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(blob_chunk::Entity::find().count(&app.db).await.unwrap(), 0);

        let again = app.delete_with_token(&routes::admin_resource(id), &admin).await;
        assert_eq!(again.status, 404);
    }
}

mod users {
    use super::*;

    #[tokio::test]
    async fn deleting_a_user_cascades_to_their_uploads_and_likes() {
        let app = TestApp::spawn().await;
        let (leaving, leaving_id) = app.create_student("leaving@example.edu").await;
        let (staying, _) = app.create_student("staying@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;

        app.approved_resource(&leaving, &admin, "Theirs").await;
        let (kept, _) = app.approved_resource(&staying, &admin, "Kept").await;
        app.post_with_token(&routes::like(kept), &json!({}), &leaving).await;
        app.post_with_token(&routes::bookmark(kept), &json!({}), &leaving).await;

        let res = app.delete_with_token(&routes::admin_user(leaving_id), &admin).await;
        assert_eq!(res.status, 204, "{}", res.text);

        let remaining = resource::Entity::find().all(&app.db).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept);
        assert_eq!(remaining[0].likes_count, 0);
        assert_eq!(resource_like::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(bookmark::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(blob_file::Entity::find().count(&app.db).await.unwrap(), 1);

        let users = app.get_with_token(routes::ADMIN_USERS, &admin).await;
        assert_eq!(users.body["total"], 2);
    }

    #[tokio::test]
    async fn admins_cannot_be_deleted_or_suspended() {
        let app = TestApp::spawn().await;
        let (admin, admin_id) = app.create_admin("admin@example.edu").await;

        let del = app.delete_with_token(&routes::admin_user(admin_id), &admin).await;
        let toggle = app
            .put_with_token(&routes::toggle_status(admin_id), &json!({}), &admin)
            .await;

        assert_eq!(del.status, 403);
        assert_eq!(toggle.status, 403);
    }

    #[tokio::test]
    async fn suspended_students_cannot_log_in_until_reactivated() {
        let app = TestApp::spawn().await;
        let (_, student_id) = app.create_student("asha@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;
        let login = json!({"email": "asha@example.edu", "password": "password123"});

        let res = app
            .put_with_token(&routes::toggle_status(student_id), &json!({}), &admin)
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["account_status"], "suspended");

        let res = app.post_without_token(routes::LOGIN, &login).await;
        assert_eq!(res.status, 403);
        assert_eq!(res.code(), "ACCOUNT_SUSPENDED");

        let res = app
            .put_with_token(&routes::toggle_status(student_id), &json!({}), &admin)
            .await;
        assert_eq!(res.body["account_status"], "active");
        assert_eq!(app.post_without_token(routes::LOGIN, &login).await.status, 200);
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let app = TestApp::spawn().await;
        let (admin, _) = app.create_admin("admin@example.edu").await;

        let res = app.delete_with_token(&routes::admin_user(4242), &admin).await;

        assert_eq!(res.status, 404);
    }
}

mod bootstrap {
    use server::config::AdminConfig;
    use server::entity::role_permission;

    use super::*;

    #[tokio::test]
    async fn configured_admin_is_created_once_and_can_moderate() {
        let app = TestApp::spawn().await;
        let config = AdminConfig {
            email: Some("Root@Example.edu".into()),
            password: Some("rootpassword".into()),
            name: "Root".into(),
        };

        server::seed::ensure_admin(&app.db, &config).await.unwrap();
        server::seed::ensure_admin(&app.db, &config).await.unwrap();

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "root@example.edu", "password": "rootpassword"}),
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["user"]["role"], "admin");

        let token = res.body["token"].as_str().unwrap();
        let stats = app.get_with_token(routes::ADMIN_STATS, token).await;
        assert_eq!(stats.status, 200);
        assert_eq!(stats.body["total_students"], 0);
    }

    #[tokio::test]
    async fn role_seeding_is_idempotent() {
        let app = TestApp::spawn().await;
        let before = role_permission::Entity::find().count(&app.db).await.unwrap();

        server::seed::seed_role_permissions(&app.db).await.unwrap();

        let after = role_permission::Entity::find().count(&app.db).await.unwrap();
        assert_eq!(before, 7);
        assert_eq!(after, before);
    }
}
