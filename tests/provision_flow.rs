//! End-to-end database provisioning against a mocked platform API.

use std::time::Duration;

use forge_deploy::config::{DatabaseSettings, EnvSource, ProcessEnv, ProvisionOutcome};
use forge_deploy::envfile::CredentialSet;
use forge_deploy::neon::{DatabaseProvisioner, NeonClient};
use forge_deploy::poller::Poller;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOST: &str = "ep-demo-123.us-east-2.aws.neon.tech";

fn fast_poller() -> Poller {
    Poller::new(Duration::from_millis(10), Duration::from_secs(5))
}

fn base_credentials(server: &MockServer) -> String {
    format!(
        "# local settings\nAPP_ENV=development\nNEON_TOKEN=tok\nNEON_API_URL={}\nNEON_PROJECT_NAME=demo\n",
        server.uri()
    )
}

async fn provision(
    credentials: &mut CredentialSet,
    env_file: &std::path::Path,
) -> forge_deploy::Result<forge_deploy::config::ProvisionReport> {
    let process = ProcessEnv::default();
    let (provisioner, client) = {
        let env = EnvSource::new(credentials, &process);
        let settings = DatabaseSettings::resolve(&env);
        let client = NeonClient::from_settings(&settings, &env)?;
        (
            DatabaseProvisioner::new(settings).with_poller(fast_poller()),
            client,
        )
    };
    provisioner.provision(&client, credentials, env_file).await
}

async fn mount_fresh_platform(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/projects"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"projects": []})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects"))
        .and(body_partial_json(json!({"project": {"name": "demo"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "project": {"id": "p-demo", "name": "demo"},
            "branch": {"id": "br-main", "name": "main"},
            "endpoints": [
                {"id": "ep-1", "host": HOST, "branch_id": "br-main", "type": "read_write"}
            ],
            "operations": [
                {"id": "op-1", "action": "create_timeline", "status": "running"},
                {"id": "op-2", "action": "start_compute", "status": "finished"}
            ]
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"operation": {"id": "op-1", "status": "finished"}}),
        ))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/p-demo/branches/br-main/roles"))
        .and(body_partial_json(json!({"role": {"name": "app"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"operations": []})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/p-demo/branches/br-main/databases"))
        .and(body_partial_json(
            json!({"database": {"name": "appdb", "owner_name": "app"}}),
        ))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"operations": []})))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_creates_demo_project_and_writes_database_url() {
    let server = MockServer::start().await;
    mount_fresh_platform(&server).await;

    let temp = TempDir::new().expect("Failed to create temp dir");
    let env_file = temp.path().join(".env");
    std::fs::write(&env_file, base_credentials(&server)).expect("write env");
    let mut credentials = CredentialSet::load(&env_file).expect("load");

    let report = provision(&mut credentials, &env_file).await.expect("provision");

    assert_eq!(report.outcome, ProvisionOutcome::Provisioned);
    assert!(report.created.iter().any(|c| c == "project demo"));
    assert!(report.created.iter().any(|c| c == "role app"));
    assert!(report.created.iter().any(|c| c == "database appdb"));

    let url = credentials.get("DATABASE_URL").expect("DATABASE_URL set").to_string();
    let password = credentials.get("NEON_DB_PASSWORD").expect("password saved");
    assert_eq!(password.len(), 64);
    assert_eq!(
        url,
        format!("postgres://app:{password}@{HOST}/appdb?sslmode=require")
    );

    let content = std::fs::read_to_string(&env_file).expect("read env");
    assert!(content.starts_with("# local settings\nAPP_ENV=development\n"));
    assert!(content.contains("# Added by forge deploy wizard"));
    assert!(content.contains(&format!("DATABASE_URL={url}")));
}

#[tokio::test]
async fn test_second_run_makes_no_calls() {
    let server = MockServer::start().await;
    mount_fresh_platform(&server).await;

    let temp = TempDir::new().expect("Failed to create temp dir");
    let env_file = temp.path().join(".env");
    std::fs::write(&env_file, base_credentials(&server)).expect("write env");

    let mut first = CredentialSet::load(&env_file).expect("load");
    provision(&mut first, &env_file).await.expect("first run");
    let after_first = std::fs::read_to_string(&env_file).expect("read env");

    let mut second = CredentialSet::load(&env_file).expect("reload");
    let report = provision(&mut second, &env_file).await.expect("second run");

    assert_eq!(report.outcome, ProvisionOutcome::AlreadyConfigured);
    assert_eq!(std::fs::read_to_string(&env_file).expect("read env"), after_first);
    // The expect(1) counts on every mock fail the test on any extra request.
    server.verify().await;
}

#[tokio::test]
async fn test_existing_remote_state_performs_zero_creates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"projects": [{"id": "p-demo", "name": "demo"}]}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/p-demo/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"branches": [{"id": "br-main", "name": "main"}]}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/p-demo/endpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"endpoints": [
            {"id": "ep-1", "host": HOST, "branch_id": "br-main", "type": "read_write"}
        ]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/p-demo/branches"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/p-demo/endpoints"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/p-demo/branches/br-main/roles"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "role \"app\" already exists"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/p-demo/branches/br-main/databases"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"message": "database \"appdb\" already exists"})),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("Failed to create temp dir");
    let env_file = temp.path().join(".env");
    std::fs::write(
        &env_file,
        format!("{}NEON_DB_PASSWORD=known-pw\n", base_credentials(&server)),
    )
    .expect("write env");
    let mut credentials = CredentialSet::load(&env_file).expect("load");

    let report = provision(&mut credentials, &env_file).await.expect("provision");

    assert!(report.created.is_empty());
    assert_eq!(
        credentials.get("DATABASE_URL"),
        Some(format!("postgres://app:known-pw@{HOST}/appdb?sslmode=require").as_str())
    );
    let content = std::fs::read_to_string(&env_file).expect("read env");
    assert_eq!(content.matches("NEON_DB_PASSWORD=").count(), 1);
}
