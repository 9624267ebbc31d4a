//! In-memory stand-in for the ReBase HTTP API.
//!
//! Movements and sessions are stored as JSON objects in insertion order.
//! Sessions do not hold their movements; a session is rendered with every
//! movement whose `sessionId` matches it.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const USER_EMAIL_HEADER: &str = "rebase-user-email";
pub const USER_TOKEN_HEADER: &str = "rebase-user-token";

const DEFAULT_PER: usize = 20;

/// Keys the server owns; never copied from a request body.
const SERVER_KEYS: &[&str] = &["id", "_id", "insertionDate", "updateDate"];
const SESSION_DERIVED_KEYS: &[&str] = &["movements", "numberOfMovements", "movementIds"];

pub type Record = Map<String, Value>;

#[derive(Debug, Default)]
pub struct Store {
    movements: Vec<Record>,
    sessions: Vec<Record>,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/movement", get(fetch_movements).post(insert_movement))
        .route(
            "/movement/{id}",
            get(find_movement).put(update_movement).delete(delete_movement),
        )
        .route("/session", get(fetch_sessions).post(insert_session))
        .route(
            "/session/{id}",
            get(find_session).put(update_session).delete(delete_session),
        )
        .layer(middleware::from_fn(require_user))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Failure reply: `{"status": 1, "message": ...}` with an HTTP status.
#[derive(Debug)]
pub struct Failure(StatusCode, String);

impl Failure {
    fn not_found(entity: &str) -> Self {
        Failure(StatusCode::NOT_FOUND, format!("{entity} not found"))
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Failure(StatusCode::BAD_REQUEST, message.into())
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        debug!(status = %self.0, message = %self.1, "request failed");
        (self.0, Json(json!({ "status": 1, "message": self.1 }))).into_response()
    }
}

async fn require_user(request: Request, next: Next) -> Response {
    let headers = request.headers();
    let authorized =
        has_header(headers, USER_EMAIL_HEADER) && has_header(headers, USER_TOKEN_HEADER);
    if !authorized {
        return Failure(StatusCode::UNAUTHORIZED, "Missing user credentials".to_string())
            .into_response();
    }
    next.run(request).await
}

fn has_header(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| !value.is_empty())
}

// ---- query parameters ----

#[derive(Debug, Default, PartialEq)]
struct Filters {
    professional_id: Option<String>,
    patient_id: Option<String>,
    movement_label: Option<String>,
    articulations: Vec<String>,
    page: usize,
    per: usize,
    previous_id: Option<String>,
    legacy: bool,
}

impl Filters {
    fn from_params(params: &[(String, String)]) -> Result<Self, Failure> {
        let mut filters = Filters {
            page: 1,
            per: DEFAULT_PER,
            ..Filters::default()
        };
        for (key, value) in params {
            match key.as_str() {
                "professionalId" => filters.professional_id = Some(value.clone()),
                "patientId" => filters.patient_id = Some(value.clone()),
                "movementLabel" => filters.movement_label = Some(value.clone()),
                "articulations" => filters.articulations.push(value.clone()),
                "page" => filters.page = positive(key, value)?,
                "per" => filters.per = positive(key, value)?,
                "previousId" => filters.previous_id = Some(value.clone()),
                "legacy" => filters.legacy = value == "true",
                _ => {}
            }
        }
        Ok(filters)
    }

    fn has_movement_filters(&self) -> bool {
        self.movement_label.is_some() || !self.articulations.is_empty()
    }

    fn matches_owner(&self, record: &Record) -> bool {
        let matches = |wanted: &Option<String>, found: Option<String>| match wanted {
            Some(wanted) => found.as_deref() == Some(wanted.as_str()),
            None => true,
        };
        matches(&self.professional_id, id_text(record.get("professionalId")))
            && matches(&self.patient_id, patient_id(record))
    }

    fn matches_movement(&self, record: &Record) -> bool {
        if let Some(label) = &self.movement_label {
            if record.get("label").and_then(Value::as_str) != Some(label.as_str()) {
                return false;
            }
        }
        let articulations = articulations_of(record);
        self.articulations
            .iter()
            .all(|wanted| articulations.contains(wanted))
    }

    /// Apply `previousId`, `page` and `per`; returns the page and the total
    /// number of candidates.
    fn paginate(&self, records: Vec<Record>) -> (Vec<Record>, usize) {
        let start = self
            .previous_id
            .as_ref()
            .and_then(|previous| {
                records
                    .iter()
                    .position(|r| id_text(r.get("id")).as_deref() == Some(previous.as_str()))
            })
            .map_or(0, |i| i + 1);
        let remaining: Vec<Record> = records.into_iter().skip(start).collect();
        let total = remaining.len();
        let page = remaining
            .into_iter()
            .skip(self.page.saturating_sub(1).saturating_mul(self.per))
            .take(self.per)
            .collect();
        (page, total)
    }

    fn meta(&self, total: usize) -> Value {
        json!({ "total": total, "page": self.page, "per": self.per })
    }
}

fn positive(key: &str, value: &str) -> Result<usize, Failure> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Failure::bad_request(format!(
            "Query parameter '{key}' must be a positive integer"
        ))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct FindOptions {
    #[serde(default)]
    legacy: bool,
}

#[derive(Debug, Default, Deserialize)]
struct DeleteOptions {
    #[serde(default)]
    deep: bool,
}

// ---- record helpers ----

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn id_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn patient_id(record: &Record) -> Option<String> {
    id_text(record.get("patientId")).or_else(|| {
        id_text(
            record
                .get("patient")
                .and_then(Value::as_object)
                .and_then(|p| p.get("id")),
        )
    })
}

fn articulations_of(record: &Record) -> Vec<String> {
    let from_list = |value: &Value| -> Option<Vec<String>> {
        value
            .as_array()?
            .iter()
            .map(|a| a.as_str().map(str::to_string))
            .collect()
    };
    if let Some(list) = record.get("articulations").and_then(from_list) {
        return list;
    }
    // Derived from the first register when the writer left it out.
    record
        .get("registers")
        .and_then(Value::as_array)
        .and_then(|registers| registers.first())
        .and_then(Value::as_object)
        .map(|register| register.keys().cloned().collect())
        .unwrap_or_default()
}

fn has_id(record: &Record, id: &str) -> bool {
    id_text(record.get("id")).as_deref() == Some(id)
}

fn entity_body(body: &Value, key: &str) -> Result<Record, Failure> {
    body.get(key)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| Failure::bad_request(format!("Missing '{key}' object in request body")))
}

/// Copy writable fields of `input` onto `record`.
fn merge(record: &mut Record, input: Record, skip: &[&str]) {
    for (key, value) in input {
        if !SERVER_KEYS.contains(&key.as_str()) && !skip.contains(&key.as_str()) {
            record.insert(key, value);
        }
    }
}

/// Old record layout: `_id` instead of `id`.
fn legacy(record: Record) -> Record {
    let mut out = Map::new();
    let mut rest = record;
    if let Some(id) = rest.shift_remove("id") {
        out.insert("_id".to_string(), id);
    }
    out.extend(rest);
    out
}

impl Store {
    fn movement(&self, id: &str) -> Option<&Record> {
        self.movements.iter().find(|r| has_id(r, id))
    }

    fn session(&self, id: &str) -> Option<&Record> {
        self.sessions.iter().find(|r| has_id(r, id))
    }

    /// Store a new movement; owner ids are inherited from its session.
    fn add_movement(&mut self, input: Record) -> Result<Record, Failure> {
        let stamp = now();
        let mut record = Map::new();
        record.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        merge(&mut record, input, &[]);

        if let Some(session_id) = id_text(record.get("sessionId")) {
            let session = self
                .session(&session_id)
                .ok_or_else(|| Failure::not_found("Session"))?;
            let professional = session.get("professionalId").cloned();
            let patient = patient_id(session).map(Value::String);
            if let Some(professional) = professional {
                record.insert("professionalId".to_string(), professional);
            }
            if let Some(patient) = patient {
                record.insert("patientId".to_string(), patient);
            }
        }
        if !record.contains_key("articulations") && record.contains_key("registers") {
            let articulations = articulations_of(&record);
            record.insert("articulations".to_string(), json!(articulations));
        }
        record.insert("insertionDate".to_string(), Value::String(stamp.clone()));
        record.insert("updateDate".to_string(), Value::String(stamp));

        self.movements.push(record.clone());
        Ok(record)
    }

    /// A session with its movements embedded, optionally narrowed by the
    /// movement filters.
    fn render_session(&self, session: &Record, filters: Option<&Filters>, legacy_layout: bool) -> Record {
        let id = id_text(session.get("id")).unwrap_or_default();
        let movements: Vec<Record> = self
            .movements
            .iter()
            .filter(|m| id_text(m.get("sessionId")).as_deref() == Some(id.as_str()))
            .filter(|m| filters.map_or(true, |f| f.matches_movement(m)))
            .cloned()
            .collect();

        let mut out = session.clone();
        out.insert("numberOfMovements".to_string(), json!(movements.len()));
        out.insert(
            "movementIds".to_string(),
            Value::Array(movements.iter().filter_map(|m| m.get("id").cloned()).collect()),
        );
        let movements = movements
            .into_iter()
            .map(|m| if legacy_layout { legacy(m) } else { m })
            .map(Value::Object)
            .collect();
        out.insert("movements".to_string(), Value::Array(movements));
        if legacy_layout {
            legacy(out)
        } else {
            out
        }
    }
}

// ---- movement handlers ----

async fn fetch_movements(
    State(db): State<Db>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, Failure> {
    let filters = Filters::from_params(&params)?;
    let store = db.read().await;
    let candidates = store
        .movements
        .iter()
        .filter(|m| filters.matches_owner(m) && filters.matches_movement(m))
        .cloned()
        .collect();
    let (page, total) = filters.paginate(candidates);
    let movements: Vec<Value> = page
        .into_iter()
        .map(|m| if filters.legacy { legacy(m) } else { m })
        .map(Value::Object)
        .collect();
    Ok(Json(json!({
        "status": 0,
        "movements": movements,
        "meta": filters.meta(total),
    })))
}

async fn find_movement(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(options): Query<FindOptions>,
) -> Result<Json<Value>, Failure> {
    let store = db.read().await;
    let movement = store.movement(&id).cloned().ok_or_else(|| Failure::not_found("Movement"))?;
    let movement = if options.legacy { legacy(movement) } else { movement };
    Ok(Json(json!({ "status": 0, "movement": movement })))
}

async fn insert_movement(
    State(db): State<Db>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), Failure> {
    let input = entity_body(&body, "movement")?;
    let movement = db.write().await.add_movement(input)?;
    info!(id = ?movement.get("id"), "movement inserted");
    Ok((StatusCode::CREATED, Json(json!({ "status": 0, "movement": movement }))))
}

async fn update_movement(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Failure> {
    let input = entity_body(&body, "movement")?;
    let mut store = db.write().await;
    let movement = store
        .movements
        .iter_mut()
        .find(|r| has_id(r, &id))
        .ok_or_else(|| Failure::not_found("Movement"))?;
    merge(movement, input, &[]);
    movement.insert("updateDate".to_string(), Value::String(now()));
    info!(%id, "movement updated");
    Ok(Json(json!({ "status": 0, "movement": movement.clone() })))
}

async fn delete_movement(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let index = store
        .movements
        .iter()
        .position(|r| has_id(r, &id))
        .ok_or_else(|| Failure::not_found("Movement"))?;
    store.movements.remove(index);
    info!(%id, "movement deleted");
    Ok(Json(json!({ "status": 0, "deletedId": id })))
}

// ---- session handlers ----

async fn fetch_sessions(
    State(db): State<Db>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, Failure> {
    let filters = Filters::from_params(&params)?;
    let store = db.read().await;
    let candidates = store
        .sessions
        .iter()
        .filter(|s| filters.matches_owner(s))
        .cloned()
        .collect();
    let (page, total) = filters.paginate(candidates);
    let movement_filters = filters.has_movement_filters().then_some(&filters);
    let sessions: Vec<Value> = page
        .iter()
        .map(|s| Value::Object(store.render_session(s, movement_filters, filters.legacy)))
        .collect();
    Ok(Json(json!({
        "status": 0,
        "sessions": sessions,
        "meta": filters.meta(total),
    })))
}

async fn find_session(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(options): Query<FindOptions>,
) -> Result<Json<Value>, Failure> {
    let store = db.read().await;
    let session = store.session(&id).ok_or_else(|| Failure::not_found("Session"))?;
    let session = store.render_session(session, None, options.legacy);
    Ok(Json(json!({ "status": 0, "session": session })))
}

async fn insert_session(
    State(db): State<Db>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), Failure> {
    let mut input = entity_body(&body, "session")?;
    let movements = match input.shift_remove("movements") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(Failure::bad_request("'movements' must be a list")),
    };
    let movements = movements
        .into_iter()
        .map(|m| match m {
            Value::Object(m) => Ok(m),
            _ => Err(Failure::bad_request("Every movement must be an object")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let stamp = now();
    let id = Uuid::new_v4().to_string();
    let mut session = Map::new();
    session.insert("id".to_string(), Value::String(id.clone()));
    merge(&mut session, input, SESSION_DERIVED_KEYS);
    session.insert("insertionDate".to_string(), Value::String(stamp.clone()));
    session.insert("updateDate".to_string(), Value::String(stamp));

    let mut store = db.write().await;
    store.sessions.push(session.clone());
    for mut movement in movements {
        movement.insert("sessionId".to_string(), Value::String(id.clone()));
        store.add_movement(movement)?;
    }
    info!(%id, "session inserted");

    let session = store.render_session(&session, None, false);
    Ok((StatusCode::CREATED, Json(json!({ "status": 0, "session": session }))))
}

async fn update_session(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Failure> {
    let input = entity_body(&body, "session")?;
    let mut store = db.write().await;
    let session = store
        .sessions
        .iter_mut()
        .find(|r| has_id(r, &id))
        .ok_or_else(|| Failure::not_found("Session"))?;
    merge(session, input, SESSION_DERIVED_KEYS);
    session.insert("updateDate".to_string(), Value::String(now()));
    info!(%id, "session updated");
    let session = session.clone();
    let session = store.render_session(&session, None, false);
    Ok(Json(json!({ "status": 0, "session": session })))
}

/// `deep=true` deletes the session's movements too; otherwise they are
/// detached from it.
async fn delete_session(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(options): Query<DeleteOptions>,
) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let index = store
        .sessions
        .iter()
        .position(|r| has_id(r, &id))
        .ok_or_else(|| Failure::not_found("Session"))?;
    store.sessions.remove(index);

    let belongs = |m: &Record| id_text(m.get("sessionId")).as_deref() == Some(id.as_str());
    if options.deep {
        store.movements.retain(|m| !belongs(m));
    } else {
        for movement in store.movements.iter_mut().filter(|m| belongs(&**m)) {
            movement.shift_remove("sessionId");
        }
    }
    info!(%id, deep = options.deep, "session deleted");
    Ok(Json(json!({ "status": 0, "deletedId": id })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn filters_default_to_first_page() {
        let filters = Filters::from_params(&[]).unwrap();
        assert_eq!(filters.page, 1);
        assert_eq!(filters.per, DEFAULT_PER);
        assert!(!filters.legacy);
    }

    #[test]
    fn filters_collect_repeated_articulations() {
        let filters = Filters::from_params(&params(&[
            ("articulations", "knee"),
            ("articulations", "hip"),
            ("per", "5"),
            ("legacy", "true"),
        ]))
        .unwrap();
        assert_eq!(filters.articulations, vec!["knee", "hip"]);
        assert_eq!(filters.per, 5);
        assert!(filters.legacy);
    }

    #[test]
    fn filters_reject_bad_page() {
        assert!(Filters::from_params(&params(&[("page", "0")])).is_err());
        assert!(Filters::from_params(&params(&[("per", "x")])).is_err());
    }

    #[test]
    fn paginate_after_previous_id() {
        let records: Vec<Record> = (1..=5).map(|i| record(json!({ "id": i.to_string() }))).collect();
        let filters = Filters::from_params(&params(&[("previousId", "2"), ("per", "2")])).unwrap();
        let (page, total) = filters.paginate(records);
        assert_eq!(total, 3);
        let ids: Vec<_> = page.iter().map(|r| id_text(r.get("id")).unwrap()).collect();
        assert_eq!(ids, vec!["3", "4"]);
    }

    #[test]
    fn paginate_far_past_the_end_is_empty() {
        let records: Vec<Record> = (1..=3).map(|i| record(json!({ "id": i.to_string() }))).collect();
        let last = usize::MAX.to_string();
        let filters = Filters::from_params(&params(&[("page", last.as_str()), ("per", "2")])).unwrap();
        let (page, total) = filters.paginate(records);
        assert!(page.is_empty());
        assert_eq!(total, 3);
    }

    #[test]
    fn has_header_requires_a_value() {
        let mut headers = HeaderMap::new();
        assert!(!has_header(&headers, USER_TOKEN_HEADER));
        headers.insert(USER_TOKEN_HEADER, "".parse().unwrap());
        assert!(!has_header(&headers, USER_TOKEN_HEADER));
        headers.insert(USER_TOKEN_HEADER, "secret".parse().unwrap());
        assert!(has_header(&headers, USER_TOKEN_HEADER));
    }

    #[test]
    fn articulations_fall_back_to_first_register() {
        let movement = record(json!({ "registers": [{ "knee": [0, 0, 0], "hip": [1, 1, 1] }] }));
        assert_eq!(articulations_of(&movement), vec!["knee", "hip"]);
    }

    #[test]
    fn patient_id_reads_nested_patient() {
        assert_eq!(patient_id(&record(json!({ "patient": { "id": 7 } }))), Some("7".to_string()));
        assert_eq!(patient_id(&record(json!({ "patientId": "p" }))), Some("p".to_string()));
        assert_eq!(patient_id(&record(json!({}))), None);
    }

    #[test]
    fn legacy_layout_renames_id() {
        let out = legacy(record(json!({ "id": "a", "label": "x" })));
        assert_eq!(Value::Object(out), json!({ "_id": "a", "label": "x" }));
    }

    #[test]
    fn merge_skips_server_keys() {
        let mut target = record(json!({ "id": "a" }));
        merge(
            &mut target,
            record(json!({ "id": "b", "insertionDate": "x", "label": "l", "movements": [] })),
            SESSION_DERIVED_KEYS,
        );
        assert_eq!(Value::Object(target), json!({ "id": "a", "label": "l" }));
    }
}
