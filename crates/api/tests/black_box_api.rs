use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use deskhive_auth::{BcryptHasher, Hs256SessionCodec};
use deskhive_infra::{AccessEngine, InMemoryDirectoryStore};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";
const PASSWORD: &str = "hunter2-but-longer";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over a fresh in-memory directory, bound to an ephemeral port.
        let engine = AccessEngine::new(
            Arc::new(InMemoryDirectoryStore::new()),
            Arc::new(Hs256SessionCodec::new(JWT_SECRET.as_bytes())),
            Arc::new(BcryptHasher::new(4)),
        );
        let app = deskhive_api::app::build_app(engine);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(format!("{}{}", self.base_url, path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Sign up a fresh tenant; returns (token, org id, user id).
    async fn signup(&self, org: &str, email: &str) -> (String, String, String) {
        let (status, body) = self
            .post(
                "/signup",
                None,
                json!({ "organizationName": org, "name": "Owner", "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["org"]["id"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    async fn create_sub(&self, token: &str, parent_id: &str, name: &str, org_type: &str) -> String {
        let (status, body) = self
            .post(
                "/organizations/create-sub",
                Some(token),
                json!({ "parentId": parent_id, "name": name, "orgType": org_type }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create-sub failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(secret: &str, user_id: &str, org_id: &str, issued: chrono::DateTime<Utc>, ttl: ChronoDuration) -> String {
    let claims = json!({
        "sub": user_id,
        "email": "minted@deskhive.test",
        "orgId": org_id,
        "role": "MANAGER",
        "iat": issued.timestamp(),
        "exp": (issued + ttl).timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn ids(items: &Value, field: &str) -> Vec<String> {
    let mut ids: Vec<String> = items
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i[field].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let (_, org_id, user_id) = srv.signup("Acme", "owner@acme.test").await;

    let res = srv.client.get(format!("{}/whoami", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let now = Utc::now();
    let expired = mint_jwt(JWT_SECRET, &user_id, &org_id, now - ChronoDuration::days(8), ChronoDuration::days(7));
    let foreign = mint_jwt("other-secret", &user_id, &org_id, now, ChronoDuration::hours(1));
    for token in [expired.as_str(), foreign.as_str(), "not-a-jwt"] {
        let (status, body) = srv.get("/whoami", token).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        // Never explains why.
        assert_eq!(body["message"], "unauthorized");
    }

    let (status, _) = srv
        .get("/whoami", &mint_jwt(JWT_SECRET, &user_id, &org_id, now, ChronoDuration::hours(1)))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn signup_grants_a_manager_session_in_the_new_root() {
    let srv = TestServer::spawn().await;
    let (token, org_id, user_id) = srv.signup("Acme", "owner@acme.test").await;

    let (status, me) = srv.get("/whoami", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["userId"], user_id.as_str());
    assert_eq!(me["orgId"], org_id.as_str());
    assert_eq!(me["role"], "MANAGER");
    assert_eq!(me["reachesSubtree"], true);
    assert_eq!(me["capabilities"]["can_create_orgs"], true);

    // Emails are globally unique; tenant names are not.
    let (status, body) = srv
        .post(
            "/signup",
            None,
            json!({ "organizationName": "Other", "name": "X", "email": "owner@acme.test", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (_, other_acme, _) = srv.signup("Acme", "x@other-acme.test").await;
    assert_ne!(other_acme, org_id);
}

#[tokio::test]
async fn sub_org_names_only_clash_between_siblings() {
    let srv = TestServer::spawn().await;
    let (acme, acme_root, _) = srv.signup("Acme", "owner@acme.test").await;
    let (globex, globex_root, _) = srv.signup("Globex", "owner@globex.test").await;

    srv.create_sub(&acme, &acme_root, "Support", "NORMAL").await;
    srv.create_sub(&globex, &globex_root, "Support", "NORMAL").await;

    let (status, body) = srv
        .post(
            "/organizations/create-sub",
            Some(&acme),
            json!({ "parentId": acme_root, "name": "Support" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn create_sub_keeps_contact_details() {
    let srv = TestServer::spawn().await;
    let (owner, root, _) = srv.signup("Root", "owner@root.test").await;

    let (status, org) = srv
        .post(
            "/organizations/create-sub",
            Some(&owner),
            json!({
                "parent_id": root,
                "name": "Branch",
                "email": "help@branch.test",
                "city": " Lisbon ",
                "latitude": 38.72,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{org}");
    assert_eq!(org["email"], "help@branch.test");
    assert_eq!(org["city"], "Lisbon");
    assert!(org.get("country").is_none());

    let (_, tree) = srv.get(&format!("/organizations/children?parent_id={root}"), &owner).await;
    assert_eq!(tree["children"][0]["latitude"], 38.72);
}

/// Owner of Root plus a second account holding a "User admin" custom role
/// there; returns (owner token, root id, owner user id, admin token).
async fn root_with_user_admin(srv: &TestServer) -> (String, String, String, String) {
    let (owner, root, owner_id) = srv.signup("Root", "owner@root.test").await;
    let (_, _, admin_id) = srv.signup("Admin home", "admin@root.test").await;

    let (status, role) = srv
        .post(
            "/roles/upsert",
            Some(&owner),
            json!({ "orgId": root, "name": "User admin", "can_view_tickets": true, "can_create_users": true }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{role}");
    let (status, body) = srv
        .post(
            "/users/assign",
            Some(&owner),
            json!({ "userId": admin_id, "orgId": root, "customRoleId": role["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, grant) = srv
        .post(
            "/login",
            None,
            json!({ "email": "admin@root.test", "password": PASSWORD, "orgId": root }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{grant}");
    let admin = grant["token"].as_str().unwrap().to_string();
    (owner, root, owner_id, admin)
}

#[tokio::test]
async fn user_admins_cannot_demote_or_remove_the_manager() {
    let srv = TestServer::spawn().await;
    let (owner, root, owner_id, admin) = root_with_user_admin(&srv).await;

    let (status, body) = srv
        .post(
            "/users/update-role",
            Some(&admin),
            json!({ "userId": owner_id, "orgId": root, "role": "VIEWER" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, _) = srv
        .post("/users/delete", Some(&admin), json!({ "userId": owner_id, "orgId": root }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, me) = srv.get("/whoami", &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "MANAGER");
}

#[tokio::test]
async fn removed_members_are_refused_with_their_old_token() {
    let srv = TestServer::spawn().await;
    let (owner, root, _) = srv.signup("Root", "owner@root.test").await;
    let (_, _, worker_id) = srv.signup("Worker home", "worker@root.test").await;
    let (status, _) = srv
        .post(
            "/users/assign",
            Some(&owner),
            json!({ "userId": worker_id, "orgId": root, "role": "TESTER" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, grant) = srv
        .post(
            "/login",
            None,
            json!({ "email": "worker@root.test", "password": PASSWORD, "orgId": root }),
        )
        .await;
    let worker = grant["token"].as_str().unwrap().to_string();
    assert_eq!(srv.get("/whoami", &worker).await.0, StatusCode::OK);

    let (status, body) = srv
        .post("/users/delete", Some(&owner), json!({ "userId": worker_id, "orgId": root }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["ok"], true);

    let (status, body) = srv.get("/whoami", &worker).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = srv
        .post("/users/delete", Some(&owner), json!({ "userId": worker_id, "orgId": root }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manager_of_a_branch_sees_only_that_branch() {
    let srv = TestServer::spawn().await;
    let (owner, root, _) = srv.signup("Root", "owner@root.test").await;
    let a = srv.create_sub(&owner, &root, "A", "NORMAL").await;
    let b = srv.create_sub(&owner, &root, "B", "NORMAL").await;
    let a1 = srv.create_sub(&owner, &a, "A1", "NORMAL").await;

    let (status, created) = srv
        .post(
            "/users/create",
            Some(&owner),
            json!({ "name": "U", "email": "u@a.test", "orgId": a, "role": "MANAGER" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let u_id = created["userId"].as_str().unwrap().to_string();

    // U's password is generated and mailed; a token for the stored membership is equivalent.
    let u = mint_jwt(JWT_SECRET, &u_id, &a, Utc::now(), ChronoDuration::hours(1));

    let (status, orgs) = srv.get("/organizations/list", &u).await;
    assert_eq!(status, StatusCode::OK);
    let mut expected = vec![a.clone(), a1.clone()];
    expected.sort();
    assert_eq!(ids(&orgs["items"], "id"), expected);

    for outside in [&root, &b] {
        let (status, body) = srv.get(&format!("/users/list?orgId={outside}"), &u).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
    }

    let (status, _) = srv.get(&format!("/users/list?orgId={a1}"), &u).await;
    assert_eq!(status, StatusCode::OK);

    // The owner at the root sees U through includeChildren.
    let (status, users) = srv.get(&format!("/users/list?orgId={root}&includeChildren=1"), &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ids(&users["items"], "userId").contains(&u_id));
    let (_, users) = srv.get(&format!("/users/list?orgId={root}"), &owner).await;
    assert!(!ids(&users["items"], "userId").contains(&u_id));

    let (status, tree) = srv.get(&format!("/organizations/children?parent_id={a}"), &u).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree["parent"]["id"], a.as_str());
    assert_eq!(ids(&tree["children"], "id"), vec![a1.clone()]);

    let (status, _) = srv.get(&format!("/organizations/children?parent_id={root}"), &u).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn client_organizations_never_get_children() {
    let srv = TestServer::spawn().await;
    let (owner, root, _) = srv.signup("Root", "owner@root.test").await;
    let client1 = srv.create_sub(&owner, &root, "Client1", "CLIENT").await;

    let (status, body) = srv
        .post(
            "/organizations/create-sub",
            Some(&owner),
            json!({ "parentId": client1, "name": "Nested", "orgType": "NORMAL" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invariant_violation");
}

#[tokio::test]
async fn login_with_two_memberships_requires_an_org_choice() {
    let srv = TestServer::spawn().await;
    let (_, org1, user_id) = srv.signup("Org1", "pat@org1.test").await;
    let (owner2, org2, _) = srv.signup("Org2", "owner@org2.test").await;

    let (status, body) = srv
        .post(
            "/users/assign",
            Some(&owner2),
            json!({ "userId": user_id, "toOrgId": org2, "role": "VIEWER" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = srv
        .post("/login", None, json!({ "email": "pat@org1.test", "password": PASSWORD }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let mut expected = vec![org1.clone(), org2.clone()];
    expected.sort();
    assert_eq!(ids(&body["memberships"], "orgId"), expected);

    let (status, grant) = srv
        .post(
            "/login",
            None,
            json!({ "email": "pat@org1.test", "password": PASSWORD, "orgId": org2 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{grant}");
    assert_eq!(grant["org"]["id"], org2.as_str());
    assert_eq!(grant["role"], "VIEWER");
    assert_eq!(grant["capabilities"]["can_view_tickets"], true);
    assert_eq!(grant["capabilities"]["can_create_users"], false);

    // A viewer cannot manage memberships.
    let viewer = grant["token"].as_str().unwrap();
    let (status, _) = srv
        .post(
            "/users/update-role",
            Some(viewer),
            json!({ "userId": user_id, "orgId": org2, "role": "MANAGER" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv
        .post("/login", None, json!({ "email": "pat@org1.test", "password": "wrong" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn custom_role_names_are_unique_per_organization() {
    let srv = TestServer::spawn().await;
    let (owner, root, _) = srv.signup("Root", "owner@root.test").await;
    let child = srv.create_sub(&owner, &root, "Child", "NORMAL").await;

    let role = |org: &str| json!({ "orgId": org, "name": "Agent", "can_view_tickets": true, "can_send_tickets": true });

    let (status, created) = srv.post("/roles/upsert", Some(&owner), role(&root)).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let (status, _) = srv.post("/roles/upsert", Some(&owner), role(&child)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = srv.post("/roles/upsert", Some(&owner), role(&root)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, catalog) = srv.get(&format!("/roles/list?orgId={root}"), &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(catalog["builtin"], json!(["MANAGER", "DEVELOPER", "TESTER", "VIEWER"]));
    assert_eq!(catalog["custom"][0]["id"], created["id"]);
    assert_eq!(catalog["custom"][0]["can_send_tickets"], true);
}

#[tokio::test]
async fn custom_role_must_belong_to_the_target_org() {
    let srv = TestServer::spawn().await;
    let (owner, root, _) = srv.signup("Root", "owner@root.test").await;
    let child = srv.create_sub(&owner, &root, "Child", "NORMAL").await;
    let (_, _, worker) = srv.signup("Worker home", "worker@root.test").await;

    let (_, role) = srv
        .post(
            "/roles/upsert",
            Some(&owner),
            json!({ "orgId": child, "name": "Agent", "can_view_tickets": true }),
        )
        .await;
    let role_id = role["id"].as_str().unwrap();

    let (status, body) = srv
        .post(
            "/users/assign",
            Some(&owner),
            json!({ "userId": worker, "orgId": root, "customRoleId": role_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, member) = srv
        .post(
            "/users/assign",
            Some(&owner),
            json!({ "userId": worker, "orgId": child, "customRoleId": role_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{member}");
    assert_eq!(member["roleType"], "CUSTOM");
    assert_eq!(member["roleLabel"], "Agent");
}

#[tokio::test]
async fn malformed_ids_are_rejected_before_the_engine() {
    let srv = TestServer::spawn().await;
    let (owner, _, _) = srv.signup("Root", "owner@root.test").await;

    let (status, body) = srv.get("/users/list?orgId=not-an-id", &owner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = srv
        .post("/organizations/create-sub", Some(&owner), json!({ "parentId": "", "name": "X" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
