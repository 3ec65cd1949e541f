/// Integration tests with mocked SIGA and MegaZap APIs
/// Exercises pagination, boleto filtering and the full run without hitting real services
use chrono::NaiveDate;
use serde_json::{json, Value};
use siga_megazap_sync::config::Config;
use siga_megazap_sync::integration::{run_for_window, RunSummary};
use siga_megazap_sync::megazap_client::MegaZapClient;
use siga_megazap_sync::models::Student;
use siga_megazap_sync::siga_client::SigaClient;
use std::collections::HashMap;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config
fn create_test_config(siga_base_url: String, megazap_base_url: String) -> Config {
    create_test_config_with(siga_base_url, megazap_base_url, &[])
}

fn create_test_config_with(
    siga_base_url: String,
    megazap_base_url: String,
    extra: &[(&str, &str)],
) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("SIGA_BASE_URL".to_string(), siga_base_url);
    vars.insert("SIGA_AUTH_TOKEN".to_string(), "siga-token".to_string());
    vars.insert("SIGA_ACTIVE_YEAR".to_string(), "2026".to_string());
    vars.insert("MEGAZAP_BASE_URL".to_string(), megazap_base_url);
    vars.insert("MEGAZAP_AUTH_TOKEN".to_string(), "megazap-token".to_string());
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned(), true).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn student_items(range: std::ops::RangeInclusive<u32>) -> Vec<Value> {
    range
        .map(|i| json!({"id": i, "nome": format!("Aluno {}", i), "telefone": format!("55119{:08}", i)}))
        .collect()
}

async fn collect_students(client: &SigaClient<'_>, year: i32) -> (Vec<Student>, usize) {
    let mut pages = client.students(year);
    let mut students = Vec::new();
    while let Some(student) = pages.next().await.unwrap() {
        students.push(student);
    }
    (students, pages.requests_issued())
}

#[tokio::test]
async fn test_single_page_with_total_pages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": student_items(1..=100), "totalPages": 1})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = SigaClient::new(&config).unwrap();
    let (students, requests) = collect_students(&client, 2026).await;

    assert_eq!(students.len(), 100);
    assert_eq!(requests, 1);
    assert_eq!(students[0].id, "1");
    assert_eq!(students[99].name, "Aluno 100");
}

#[tokio::test]
async fn test_pages_until_empty_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": student_items(1..=100)})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = SigaClient::new(&config).unwrap();
    let (students, requests) = collect_students(&client, 2026).await;

    assert_eq!(students.len(), 100);
    assert_eq!(requests, 2);
}

#[tokio::test]
async fn test_empty_page_stops_despite_total_pages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "totalPages": 5})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": student_items(1..=3)})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = SigaClient::new(&config).unwrap();
    let (students, requests) = collect_students(&client, 2026).await;

    assert!(students.is_empty());
    assert_eq!(requests, 1);
}

#[tokio::test]
async fn test_stops_at_declared_total_on_non_empty_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": student_items(1..=3), "pages": 2})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": student_items(4..=5), "pages": 2})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": student_items(6..=7)})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = SigaClient::new(&config).unwrap();
    let (students, requests) = collect_students(&client, 2026).await;

    let ids: Vec<&str> = students.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    assert_eq!(requests, 2);
}

#[tokio::test]
async fn test_students_request_carries_auth_and_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/alunos"))
        .and(query_param("ativo", "true"))
        .and(query_param("ano", "2026"))
        .and(query_param("page", "1"))
        .and(query_param("pageSize", "25"))
        .and(header("X-Token", "Token siga-token"))
        .and(header("X-Escola", "42"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": student_items(1..=2), "totalPages": 1})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config_with(
        format!("{}/api", mock_server.uri()),
        mock_server.uri(),
        &[
            ("SIGA_AUTH_HEADER", "X-Token"),
            ("SIGA_AUTH_PREFIX", "Token"),
            ("SIGA_PAGE_SIZE", "25"),
            ("SIGA_EXTRA_HEADERS_JSON", r#"{"X-Escola": "42"}"#),
        ],
    );
    let client = SigaClient::new(&config).unwrap();
    let (students, _) = collect_students(&client, 2026).await;

    assert_eq!(students.len(), 2);
}

#[tokio::test]
async fn test_enumeration_is_lazy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": student_items(1..=2)})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alunos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = SigaClient::new(&config).unwrap();
    let mut pages = client.students(2026);

    let first = pages.next().await.unwrap().unwrap();
    let second = pages.next().await.unwrap().unwrap();
    assert_eq!(first.id, "1");
    assert_eq!(second.id, "2");
    // Page 2 is only requested when the cursor is advanced again
    assert_eq!(pages.requests_issued(), 1);
}

#[tokio::test]
async fn test_exhausted_cursor_stays_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alunos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": student_items(1..=1), "totalPages": 1})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = SigaClient::new(&config).unwrap();
    let mut pages = client.students(2026);

    assert!(pages.next().await.unwrap().is_some());
    assert!(pages.next().await.unwrap().is_none());
    assert!(pages.next().await.unwrap().is_none());
    assert!(pages.is_exhausted());
}

#[tokio::test]
async fn test_students_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alunos"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = SigaClient::new(&config).unwrap();
    let mut pages = client.students(2026);

    let err = pages.next().await.unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_due_boletos_filtered_by_window() {
    let mock_server = MockServer::start().await;

    let mock_response = json!({
        "items": [
            {"id": "in", "dataVencimento": "2025-01-10", "valor": 120.5,
             "codigoBarras": "2379", "linhaDigitavel": "2379.1"},
            {"id": "edge-start", "dataVencimento": "2025-01-05T09:00:00"},
            {"id": "edge-end", "vencimento": "2025-01-15"},
            {"id": "late", "dataVencimento": "2025-01-16"},
            {"id": "early", "dataVencimento": "2025-01-04"},
            {"id": "bad-date", "dataVencimento": "10/01/2025"},
            {"id": "no-date"}
        ]
    });

    Mock::given(method("GET"))
        .and(path("/alunos/981/boletos"))
        .and(query_param("dataVencimentoInicio", "2025-01-05"))
        .and(query_param("dataVencimentoFim", "2025-01-15"))
        .and(header("Authorization", "Bearer siga-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = SigaClient::new(&config).unwrap();
    let boletos = client
        .due_boletos("981", date(2025, 1, 5), date(2025, 1, 15))
        .await
        .unwrap();

    let ids: Vec<&str> = boletos.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["in", "edge-start", "edge-end"]);
    assert_eq!(boletos[0].due_date, date(2025, 1, 10));
    assert_eq!(boletos[0].amount, 120.5);
    assert_eq!(boletos[0].barcode, "2379");
    assert_eq!(boletos[0].line_digit, "2379.1");
    assert_eq!(boletos[1].amount, 0.0);
}

#[tokio::test]
async fn test_due_boletos_alternate_list_key_and_amount() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alunos/7/boletos"))
        .and(query_param("alunoId", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "boletos": [{"codigo": 55, "dataVencimento": "2025-01-10", "valor_boleto": 50.0}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config_with(
        mock_server.uri(),
        mock_server.uri(),
        &[("SIGA_BOLETOS_STUDENT_PARAM", "alunoId")],
    );
    let client = SigaClient::new(&config).unwrap();
    let boletos = client
        .due_boletos("7", date(2025, 1, 5), date(2025, 1, 15))
        .await
        .unwrap();

    assert_eq!(boletos.len(), 1);
    assert_eq!(boletos[0].id, "55");
    assert_eq!(boletos[0].amount, 50.0);
}

#[tokio::test]
async fn test_megazap_send_success() {
    let mock_server = MockServer::start().await;

    let payload = json!({"telefone": "5511987654321", "mensagem": "Olá"});
    Mock::given(method("POST"))
        .and(path("/whatsapp/qrcode"))
        .and(header("Authorization", "Bearer megazap-token"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued", "id": "m-1"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = MegaZapClient::new(&config).unwrap();
    let response = client
        .send_qrcode(payload.as_object().unwrap())
        .await
        .unwrap();

    assert_eq!(response["status"], "queued");
}

#[tokio::test]
async fn test_megazap_send_error_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/whatsapp/qrcode"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let client = MegaZapClient::new(&config).unwrap();
    let err = client
        .send_qrcode(&serde_json::Map::new())
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert!(err.to_string().contains("invalid token"));
}

/// Mounts a one-page roster: one student without id and two real students.
async fn mount_roster(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/alunos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"nome": "Sem Id"},
                {"id": 1, "nome": "Ana", "celular": "5511900000001"},
                {"codigo": "2", "name": "Bruno", "phone": "5511900000002"}
            ],
            "totalPages": 1
        })))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alunos/1/boletos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "b1", "dataVencimento": "2025-01-10", "valor": 99.9},
                {"id": "old", "dataVencimento": "2024-12-01", "valor": 10}
            ]
        })))
        .expect(1)
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alunos/2/boletos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_run_dry_run_sends_nothing() {
    let mock_server = MockServer::start().await;
    mount_roster(&mock_server).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let summary = run_for_window(&config, date(2025, 1, 5), date(2025, 1, 10), true)
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            students_seen: 3,
            students_skipped: 1,
            boletos_due: 1,
            notifications_sent: 0,
            dry_run_logged: 1,
        }
    );
}

#[tokio::test]
async fn test_run_sends_payload_with_template() {
    let mock_server = MockServer::start().await;
    mount_roster(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/whatsapp/qrcode"))
        .and(body_json(json!({
            "canal": "whatsapp",
            "mensagem": "Custom",
            "telefone": "5511900000001",
            "valor": 99.9,
            "codigoBarras": "",
            "linhaDigitavel": "",
            "dataVencimento": "2025-01-10"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config_with(
        mock_server.uri(),
        mock_server.uri(),
        &[(
            "MEGAZAP_PAYLOAD_TEMPLATE_JSON",
            r#"{"canal": "whatsapp", "mensagem": "Custom"}"#,
        )],
    );
    let summary = run_for_window(&config, date(2025, 1, 5), date(2025, 1, 10), false)
        .await
        .unwrap();

    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(summary.dry_run_logged, 0);
}

#[tokio::test]
async fn test_run_aborts_on_first_transport_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alunos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 1, "nome": "Ana"}, {"id": 2, "nome": "Bruno"}],
            "totalPages": 1
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alunos/1/boletos"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alunos/2/boletos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri(), mock_server.uri());
    let err = run_for_window(&config, date(2025, 1, 5), date(2025, 1, 10), true)
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert!(err.to_string().contains("student 1"));
}
