//! Integration tests for the full access pipeline.
//!
//! Tests: signup/login → token → principal → scope → capability → store
//!
//! Verifies:
//! - Tokens are scoped to exactly one organization
//! - Hierarchy reach follows the derived capability set
//! - Writes made through one session are visible to the checks of the next

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use deskhive_auth::{BcryptHasher, Capabilities, Hs256SessionCodec, RoleType};
    use deskhive_core::{OrgId, OrgProfile, OrgType};

    use crate::access::{
        AccessEngine, AssignMember, CreateMember, CreateSubOrg, LoginOutcome, LoginRequest, RemoveMember, SessionGrant,
        SignupRequest, UpsertRole,
    };
    use crate::error::AccessError;
    use crate::store::InMemoryDirectoryStore;

    fn engine() -> AccessEngine {
        AccessEngine::new(
            Arc::new(InMemoryDirectoryStore::new()),
            Arc::new(Hs256SessionCodec::new(b"integration-secret")),
            Arc::new(BcryptHasher::new(4)),
        )
    }

    async fn signup(engine: &AccessEngine, org: &str, email: &str) -> SessionGrant {
        engine
            .signup(SignupRequest {
                organization_name: org.to_string(),
                name: "Owner".to_string(),
                email: email.to_string(),
                password: "owner-pass".to_string(),
            })
            .await
            .unwrap()
    }

    async fn login(engine: &AccessEngine, email: &str, password: &str, org_id: Option<OrgId>) -> LoginOutcome {
        engine
            .login(LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
                org_id,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn delegated_administration_across_the_tree() {
        let engine = engine();
        let owner = signup(&engine, "Root", "owner@root.test").await;
        let root_id = owner.org.id;
        let owner_p = engine.authenticate(&owner.token).await.unwrap();

        let a = engine
            .create_sub_org(
                &owner_p,
                CreateSubOrg {
                    parent_id: root_id,
                    name: "A".into(),
                    org_type: OrgType::Normal,
                    profile: OrgProfile::default(),
                },
            )
            .await
            .unwrap();
        let b = engine
            .create_sub_org(
                &owner_p,
                CreateSubOrg {
                    parent_id: root_id,
                    name: "B".into(),
                    org_type: OrgType::Normal,
                    profile: OrgProfile::default(),
                },
            )
            .await
            .unwrap();
        let a1 = engine
            .create_sub_org(
                &owner_p,
                CreateSubOrg {
                    parent_id: a.id,
                    name: "A1".into(),
                    org_type: OrgType::Client,
                    profile: OrgProfile::default(),
                },
            )
            .await
            .unwrap();

        // A regional manager for A only.
        let regional = engine
            .create_member(
                &owner_p,
                CreateMember {
                    name: "Regional".into(),
                    email: "regional@a.test".into(),
                    org_id: a.id,
                    role: Some("MANAGER".into()),
                    custom_role_id: None,
                },
            )
            .await
            .unwrap();

        // Created accounts get a generated password, so the login path uses a
        // signed-up account promoted into A.
        let lead = signup(&engine, "Lead home", "lead@a.test").await;
        engine
            .assign_member(
                &owner_p,
                AssignMember {
                    user_id: lead.user.id,
                    org_id: a.id,
                    role: Some("MANAGER".into()),
                    custom_role_id: None,
                },
            )
            .await
            .unwrap();

        let outcome = login(&engine, "lead@a.test", "owner-pass", None).await;
        let LoginOutcome::OrgSelectionRequired(candidates) = outcome else {
            panic!("lead has two memberships");
        };
        assert_eq!(candidates.len(), 2);

        let LoginOutcome::Granted(lead_in_a) = login(&engine, "lead@a.test", "owner-pass", Some(a.id)).await else {
            panic!("explicit org selection must grant a session");
        };
        let lead_p = engine.authenticate(&lead_in_a.token).await.unwrap();

        let mut visible: Vec<OrgId> = engine.list_orgs(&lead_p).await.unwrap().into_iter().map(|o| o.id).collect();
        visible.sort();
        let mut expected = vec![a.id, a1.id];
        expected.sort();
        assert_eq!(visible, expected);

        for target in [root_id, b.id] {
            assert!(matches!(
                engine.list_users(&lead_p, Some(target), false).await,
                Err(AccessError::Forbidden(_))
            ));
        }

        let a_users = engine.list_users(&lead_p, Some(a.id), true).await.unwrap();
        assert!(a_users.iter().any(|m| m.user_id == regional.user_id));

        // A1 is a CLIENT org: nothing may be created under it.
        let err = engine
            .create_sub_org(
                &lead_p,
                CreateSubOrg {
                    parent_id: a1.id,
                    name: "Nested".into(),
                    org_type: OrgType::Normal,
                    profile: OrgProfile::default(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn custom_roles_drive_capabilities_after_reassignment() {
        let engine = engine();
        let owner = signup(&engine, "Acme", "owner@acme.test").await;
        let owner_p = engine.authenticate(&owner.token).await.unwrap();
        let worker = signup(&engine, "Worker home", "worker@acme.test").await;

        let dispatcher = engine
            .upsert_role(
                &owner_p,
                UpsertRole {
                    id: None,
                    org_id: owner.org.id,
                    name: "Dispatcher".into(),
                    capabilities: Capabilities {
                        can_send_tickets: true,
                        can_create_users: true,
                        ..Capabilities::view_only()
                    },
                },
            )
            .await
            .unwrap();

        engine
            .assign_member(
                &owner_p,
                AssignMember {
                    user_id: worker.user.id,
                    org_id: owner.org.id,
                    role: Some("DEVELOPER".into()),
                    custom_role_id: Some(dispatcher.id),
                },
            )
            .await
            .unwrap();

        let LoginOutcome::Granted(session) =
            login(&engine, "worker@acme.test", "owner-pass", Some(owner.org.id)).await
        else {
            panic!("worker selected an org explicitly");
        };
        assert_eq!(session.role, "Dispatcher");
        assert_eq!(session.role_type, RoleType::Custom);

        let worker_p = engine.authenticate(&session.token).await.unwrap();
        assert!(worker_p.capabilities.can_send_tickets);
        assert!(!worker_p.reaches_subtree());

        // Tightening the role takes effect on the next request with the same token.
        engine
            .upsert_role(
                &owner_p,
                UpsertRole {
                    id: Some(dispatcher.id),
                    org_id: owner.org.id,
                    name: "Dispatcher".into(),
                    capabilities: Capabilities::view_only(),
                },
            )
            .await
            .unwrap();
        let worker_p = engine.authenticate(&session.token).await.unwrap();
        assert_eq!(worker_p.capabilities, Capabilities::view_only());
    }

    #[tokio::test]
    async fn removed_members_lose_access_with_their_old_token() {
        let engine = engine();
        let owner = signup(&engine, "Acme", "owner@acme.test").await;
        let owner_p = engine.authenticate(&owner.token).await.unwrap();
        let worker = signup(&engine, "Worker home", "worker@acme.test").await;
        engine
            .assign_member(
                &owner_p,
                AssignMember {
                    user_id: worker.user.id,
                    org_id: owner.org.id,
                    role: Some("TESTER".into()),
                    custom_role_id: None,
                },
            )
            .await
            .unwrap();

        let LoginOutcome::Granted(session) =
            login(&engine, "worker@acme.test", "owner-pass", Some(owner.org.id)).await
        else {
            panic!("worker selected an org explicitly");
        };
        assert!(engine.authenticate(&session.token).await.is_ok());

        engine
            .remove_member(
                &owner_p,
                RemoveMember {
                    user_id: worker.user.id,
                    org_id: owner.org.id,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            engine.authenticate(&session.token).await,
            Err(AccessError::Forbidden(_))
        ));

        // The home tenant membership is untouched.
        let home = engine.authenticate(&worker.token).await.unwrap();
        assert_eq!(home.active_org_id, worker.org.id);
    }
}
