use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

use server::entity::{blob_chunk, blob_file};

use crate::common::{FilePart, TestApp, resource_fields, routes, sample_bytes};

async fn blob_rows(app: &TestApp) -> (u64, u64) {
    let files = blob_file::Entity::find().count(&app.db).await.unwrap();
    let chunks = blob_chunk::Entity::find().count(&app.db).await.unwrap();
    (files, chunks)
}

mod upload {
    use super::*;

    #[tokio::test]
    async fn creates_a_pending_resource_with_a_file_url() {
        let app = TestApp::spawn().await;
        let (token, user_id) = app.create_student("asha@example.edu").await;

        let body = app
            .upload_resource(&token, "Linked Lists", sample_bytes(4096))
            .await;

        assert_eq!(body["status"], "pending");
        assert_eq!(body["likes_count"], 0);
        assert_eq!(body["file_name"], "Linked Lists.pdf");
        assert_eq!(body["uploader"]["id"], user_id);
        let file_id = body["file_id"].as_str().unwrap();
        assert_eq!(file_id.len(), 32);
        assert_eq!(body["file_url"], format!("/api/v1/files/{file_id}"));

        let info = app.get_without_token(&routes::file_info(file_id)).await;
        assert_eq!(info.status, 200, "{}", info.text);
        assert_eq!(info.body["size_bytes"], 4096);
        assert_eq!(info.body["custom_metadata"]["uploaderId"], user_id.to_string());
    }

    #[tokio::test]
    async fn accepts_the_legacy_type_field() {
        let app = TestApp::spawn().await;
        let (token, _) = app.create_student("asha@example.edu").await;

        let mut fields = resource_fields("Old Client");
        fields.retain(|(name, _)| *name != "kind");
        fields.push(("type", "PYQ".to_string()));

        let res = app
            .upload(&fields, Some(FilePart::pdf("paper.pdf", sample_bytes(100))), &token)
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["kind"], "PYQ");
    }

    #[tokio::test]
    async fn requires_a_file() {
        let app = TestApp::spawn().await;
        let (token, _) = app.create_student("asha@example.edu").await;

        let res = app.upload(&resource_fields("No File"), None, &token).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn rejects_non_pdf_files_without_storing_anything() {
        let app = TestApp::spawn().await;
        let (token, _) = app.create_student("asha@example.edu").await;

        let file = FilePart {
            name: "notes.docx".to_string(),
            mime: "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                .to_string(),
            bytes: vec![1; 512],
        };
        let res = app.upload(&resource_fields("Word"), Some(file), &token).await;

        assert_eq!(res.status, 415, "{}", res.text);
        assert_eq!(res.code(), "INVALID_FILE_TYPE");
        assert_eq!(blob_rows(&app).await, (0, 0));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_and_rolled_back() {
        let app = TestApp::spawn().await;
        let (token, _) = app.create_student("asha@example.edu").await;

        let too_big = sample_bytes(crate::common::TEST_MAX_SIZE as usize + 10);
        let res = app
            .upload(
                &resource_fields("Huge"),
                Some(FilePart::pdf("huge.pdf", too_big)),
                &token,
            )
            .await;

        assert_eq!(res.status, 413, "{}", res.text);
        assert_eq!(res.code(), "PAYLOAD_TOO_LARGE");
        assert_eq!(blob_rows(&app).await, (0, 0));
    }

    #[tokio::test]
    async fn invalid_fields_discard_the_stored_file() {
        let app = TestApp::spawn().await;
        let (token, _) = app.create_student("asha@example.edu").await;

        let mut fields = resource_fields("Bad Semester");
        fields.retain(|(name, _)| *name != "semester");
        fields.push(("semester", "9".to_string()));

        let res = app
            .upload(&fields, Some(FilePart::pdf("unit.pdf", sample_bytes(200_000))), &token)
            .await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert_eq!(blob_rows(&app).await, (0, 0));
    }

    #[tokio::test]
    async fn requires_authentication() {
        let app = TestApp::spawn().await;

        let res = app
            .upload(
                &resource_fields("Anon"),
                Some(FilePart::pdf("a.pdf", sample_bytes(10))),
                "bogus",
            )
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "TOKEN_INVALID");
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn only_approved_resources_are_listed_newest_first() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;

        let (first, _) = app.approved_resource(&student, &admin, "First").await;
        let (second, _) = app.approved_resource(&student, &admin, "Second").await;
        app.upload_resource(&student, "Still Pending", sample_bytes(64))
            .await;

        let res = app.get_without_token(routes::RESOURCES).await;

        assert_eq!(res.status, 200, "{}", res.text);
        let ids: Vec<i64> = res.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![second as i64, first as i64]);
        assert_eq!(res.body["pagination"]["total"], 2);
        assert_eq!(res.body["pagination"]["per_page"], 12);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_treats_wildcards_literally() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;

        app.approved_resource(&student, &admin, "Graph Algorithms").await;
        app.approved_resource(&student, &admin, "Sorting 100%").await;

        let res = app
            .get_without_token(&format!("{}?search=GRAPH", routes::RESOURCES))
            .await;
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["title"], "Graph Algorithms");

        let res = app
            .get_without_token(&format!("{}?search=%25", routes::RESOURCES))
            .await;
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["title"], "Sorting 100%");
    }

    #[tokio::test]
    async fn filters_and_pagination_combine() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;

        for title in ["A", "B", "C"] {
            app.approved_resource(&student, &admin, title).await;
        }

        let res = app
            .get_without_token(&format!(
                "{}?branch=CSE&semester=3&subject=data&kind=Notes&per_page=2&page=2",
                routes::RESOURCES
            ))
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["pagination"]["total"], 3);
        assert_eq!(res.body["pagination"]["total_pages"], 2);
        assert_eq!(res.body["data"].as_array().unwrap().len(), 1);
        assert_eq!(res.body["data"][0]["title"], "A");

        let res = app
            .get_without_token(&format!("{}?kind=Lab", routes::RESOURCES))
            .await;
        assert_eq!(res.body["pagination"]["total"], 0);
    }
}

mod visibility {
    use super::*;

    #[tokio::test]
    async fn pending_resource_is_hidden_from_others() {
        let app = TestApp::spawn().await;
        let (owner, _) = app.create_student("owner@example.edu").await;
        let (other, _) = app.create_student("other@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;

        let body = app.upload_resource(&owner, "Draft", sample_bytes(64)).await;
        let id = body["id"].as_i64().unwrap() as i32;

        assert_eq!(app.get_without_token(&routes::resource(id)).await.status, 403);
        assert_eq!(app.get_with_token(&routes::resource(id), &other).await.status, 403);
        assert_eq!(app.get_with_token(&routes::resource(id), &owner).await.status, 200);
        assert_eq!(app.get_with_token(&routes::resource(id), &admin).await.status, 200);
    }

    #[tokio::test]
    async fn approved_resource_is_public_and_missing_is_404() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;
        let (id, _) = app.approved_resource(&student, &admin, "Public").await;

        let res = app.get_without_token(&routes::resource(id)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["title"], "Public");

        let res = app.get_without_token(&routes::resource(9999)).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.code(), "NOT_FOUND");
    }
}

mod interactions {
    use super::*;

    #[tokio::test]
    async fn like_toggles_and_count_follows() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let (fan, _) = app.create_student("fan@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;
        let (id, _) = app.approved_resource(&student, &admin, "Liked").await;

        let res = app.post_with_token(&routes::like(id), &json!({}), &fan).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body, json!({"liked": true, "likes_count": 1}));

        let res = app.post_with_token(&routes::like(id), &json!({}), &student).await;
        assert_eq!(res.body, json!({"liked": true, "likes_count": 2}));

        let me = app.get_with_token(routes::ME, &fan).await;
        assert_eq!(me.body["liked_resources"], json!([id]));

        let res = app.post_with_token(&routes::like(id), &json!({}), &fan).await;
        assert_eq!(res.body, json!({"liked": false, "likes_count": 1}));
    }

    #[tokio::test]
    async fn cannot_interact_with_pending_resources() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let body = app.upload_resource(&student, "Pending", sample_bytes(64)).await;
        let id = body["id"].as_i64().unwrap() as i32;

        let like = app.post_with_token(&routes::like(id), &json!({}), &student).await;
        let mark = app.post_with_token(&routes::bookmark(id), &json!({}), &student).await;

        assert_eq!(like.status, 403);
        assert_eq!(mark.status, 403);
    }

    #[tokio::test]
    async fn bookmarks_toggle_and_are_listed() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;
        let (first, _) = app.approved_resource(&student, &admin, "One").await;
        let (second, _) = app.approved_resource(&student, &admin, "Two").await;

        for id in [first, second] {
            let res = app.post_with_token(&routes::bookmark(id), &json!({}), &student).await;
            assert_eq!(res.body, json!({"bookmarked": true}));
        }
        let res = app.post_with_token(&routes::bookmark(first), &json!({}), &student).await;
        assert_eq!(res.body, json!({"bookmarked": false}));

        let res = app.get_with_token(routes::MY_BOOKMARKS, &student).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["count"], 1);
        assert_eq!(res.body["data"][0]["id"], second);

        let me = app.get_with_token(routes::ME, &student).await;
        assert_eq!(me.body["bookmarks"], json!([second]));
    }

    #[tokio::test]
    async fn my_uploads_includes_every_status() {
        let app = TestApp::spawn().await;
        let (student, _) = app.create_student("asha@example.edu").await;
        let (admin, _) = app.create_admin("admin@example.edu").await;
        app.approved_resource(&student, &admin, "Approved").await;
        app.upload_resource(&student, "Pending", sample_bytes(64)).await;

        let res = app.get_with_token(routes::MY_UPLOADS, &student).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["count"], 2);
        assert_eq!(res.body["data"][0]["title"], "Pending");
        assert_eq!(res.body["data"][1]["title"], "Approved");
    }
}
