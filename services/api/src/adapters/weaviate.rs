//! services/api/src/adapters/weaviate.rs
//!
//! This module contains the vector-store adapter backed by Weaviate.
//! It implements the `InterviewRepository` port from the `core` crate.
//!
//! Objects are written through the REST `objects` API and read back through
//! GraphQL `Get` queries. Every object id is a UUIDv5 derived from a business
//! key, so writing the same goal, session, chunk or profile twice lands on the
//! same object.

use async_trait::async_trait;
use interview_core::{
    domain::{
        EvaluationMetric, GoalStatus, InterviewPlan, InterviewSession, PsychometricProfile,
        ResearchGoal, SummaryChunk, TranscriptChunk,
    },
    ports::{EmbeddedChunk, InterviewRepository, PortError, PortResult, SessionFilter},
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

const LIST_LIMIT: usize = 100;
const CHUNK_LIMIT: usize = 1000;

//=========================================================================================
// Schema
//=========================================================================================

pub struct ClassDef {
    pub name: &'static str,
    pub description: &'static str,
    pub properties: &'static [(&'static str, &'static str)],
}

pub const SCHEMA: &[ClassDef] = &[
    ClassDef {
        name: "ResearchGoal",
        description: "Research goals and objectives",
        properties: &[
            ("goalId", "text"),
            ("goalText", "text"),
            ("targetAudience", "text"),
            ("durationMinutes", "int"),
            ("sensitiveTopics", "text[]"),
            ("status", "text"),
            ("adminId", "text"),
            ("clarifications", "text[]"),
            ("brief", "text"),
            ("createdAt", "date"),
        ],
    },
    ClassDef {
        name: "InterviewPlan",
        description: "Interview scripts generated from research goals",
        properties: &[
            ("planId", "text"),
            ("researchGoalId", "text"),
            ("introduction", "text"),
            ("questions", "text"),
            ("followUps", "text"),
            ("closingRemarks", "text"),
            ("reminders", "text[]"),
            ("version", "int"),
            ("createdAt", "date"),
        ],
    },
    ClassDef {
        name: "InterviewSession",
        description: "Interview session metadata and transcripts",
        properties: &[
            ("sessionId", "text"),
            ("researchGoal", "text"),
            ("planId", "text"),
            ("participantEmail", "text"),
            ("participantName", "text"),
            ("roomName", "text"),
            ("avatarAgentId", "text"),
            ("avatarSessionId", "text"),
            ("status", "text"),
            ("startTime", "date"),
            ("endTime", "date"),
            ("transcript", "text"),
            ("summary", "text"),
            ("keyFindings", "text[]"),
            ("psychometricProfile", "text"),
            ("createdAt", "date"),
            ("updatedAt", "date"),
        ],
    },
    ClassDef {
        name: "TranscriptChunk",
        description: "Individual interview transcript chunks",
        properties: &[
            ("sessionId", "text"),
            ("turnIndex", "int"),
            ("partNumber", "int"),
            ("totalParts", "int"),
            ("originalMessageId", "text"),
            ("speaker", "text"),
            ("text", "text"),
            ("topic", "text"),
            ("summary", "text"),
            ("keywords", "text[]"),
            ("sentiment", "text"),
            ("confidence", "number"),
            ("timestamp", "date"),
        ],
    },
    ClassDef {
        name: "SummaryChunk",
        description: "Summaries of interview sessions",
        properties: &[
            ("summaryId", "text"),
            ("sessionId", "text"),
            ("chunkId", "text"),
            ("summary", "text"),
            ("keywords", "text[]"),
            ("keyInsights", "text[]"),
            ("painPoints", "text[]"),
            ("featureRequests", "text[]"),
            ("createdAt", "date"),
        ],
    },
    ClassDef {
        name: "PsychometricProfile",
        description: "Psychological profiles from interviews",
        properties: &[
            ("sessionId", "text"),
            ("openness", "int"),
            ("conscientiousness", "int"),
            ("extraversion", "int"),
            ("agreeableness", "int"),
            ("neuroticism", "int"),
            ("enneagramType", "int"),
            ("explanation", "text"),
            ("overallProfile", "text"),
            ("keyInsights", "text[]"),
            ("createdAt", "date"),
        ],
    },
    ClassDef {
        name: "EvaluationMetric",
        description: "Quality metrics recorded against interview sessions",
        properties: &[
            ("metricId", "text"),
            ("sessionId", "text"),
            ("metricType", "text"),
            ("score", "number"),
            ("explanation", "text"),
            ("traceId", "text"),
            ("createdAt", "date"),
        ],
    },
];

fn class(name: &str) -> PortResult<&'static ClassDef> {
    SCHEMA
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| PortError::Unexpected(format!("unknown Weaviate class {name}")))
}

fn class_definition(def: &ClassDef) -> Value {
    let properties: Vec<Value> = def
        .properties
        .iter()
        .map(|(name, data_type)| json!({ "name": name, "dataType": [data_type] }))
        .collect();
    json!({
        "class": def.name,
        "description": def.description,
        "vectorizer": "text2vec-openai",
        "properties": properties,
    })
}

//=========================================================================================
// Deterministic Ids
//=========================================================================================

pub fn object_id(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}

pub fn goal_object_id(goal_id: &str) -> Uuid {
    object_id(&format!("research-goal:{goal_id}"))
}

pub fn session_object_id(session_id: &str) -> Uuid {
    object_id(&format!("{session_id}:session"))
}

pub fn chunk_object_id(session_id: &str, chunk: &TranscriptChunk) -> Uuid {
    object_id(&format!(
        "{}:{}:{}:{}",
        session_id,
        chunk.timestamp.to_rfc3339(),
        chunk.speaker.as_str(),
        chunk.text
    ))
}

pub fn profile_object_id(session_id: &str) -> Uuid {
    object_id(&format!("{session_id}:psychometric"))
}

pub fn metric_object_id(metric_id: &str) -> Uuid {
    object_id(&format!("metric:{metric_id}"))
}

//=========================================================================================
// GraphQL Queries
//=========================================================================================

/// A `where` filter: text equality, or several of them joined with `And`.
#[derive(Debug, Clone)]
pub enum Filter {
    TextEqual { path: &'static str, value: String },
    All(Vec<Filter>),
}

impl Filter {
    pub fn text_equal(path: &'static str, value: impl Into<String>) -> Self {
        Filter::TextEqual {
            path,
            value: value.into(),
        }
    }

    /// Renders the filter as a GraphQL input object. String values use JSON
    /// escaping, which GraphQL string literals accept.
    fn render(&self) -> String {
        match self {
            Filter::TextEqual { path, value } => format!(
                "{{path: [\"{path}\"], operator: Equal, valueText: {}}}",
                Value::String(value.clone())
            ),
            Filter::All(operands) => format!(
                "{{operator: And, operands: [{}]}}",
                operands
                    .iter()
                    .map(Filter::render)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetQuery {
    pub class: &'static str,
    pub filter: Option<Filter>,
    pub near_text: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Property to sort on and whether the order is ascending.
    pub sort: Option<(&'static str, bool)>,
}

impl GetQuery {
    pub fn new(class: &'static str) -> Self {
        Self {
            class,
            filter: None,
            near_text: None,
            limit: None,
            offset: None,
            sort: None,
        }
    }

    pub fn render(&self) -> PortResult<String> {
        let def = class(self.class)?;
        let mut args = Vec::new();
        if let Some(filter) = &self.filter {
            args.push(format!("where: {}", filter.render()));
        }
        if let Some(concept) = &self.near_text {
            args.push(format!(
                "nearText: {{concepts: [{}]}}",
                Value::String(concept.clone())
            ));
        }
        if let Some((path, ascending)) = self.sort {
            let order = if ascending { "asc" } else { "desc" };
            args.push(format!("sort: [{{path: [\"{path}\"], order: {order}}}]"));
        }
        if let Some(limit) = self.limit {
            args.push(format!("limit: {limit}"));
        }
        if let Some(offset) = self.offset {
            args.push(format!("offset: {offset}"));
        }

        let fields: Vec<&str> = def.properties.iter().map(|(name, _)| *name).collect();
        let args = if args.is_empty() {
            String::new()
        } else {
            format!("({})", args.join(", "))
        };
        Ok(format!(
            "{{ Get {{ {}{} {{ {} _additional {{ id }} }} }} }}",
            self.class,
            args,
            fields.join(" ")
        ))
    }
}

//=========================================================================================
// Record Mapping
//=========================================================================================

/// Weaviate returns `null` for unset properties; domain types expect them absent.
fn strip_nulls(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => Map::new(),
    }
}

fn to_properties<T: Serialize>(value: &T) -> PortResult<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(value @ Value::Object(_)) => Ok(strip_nulls(value)),
        Ok(_) => Err(PortError::Unexpected("expected an object".to_string())),
        Err(e) => Err(PortError::Unexpected(e.to_string())),
    }
}

fn from_properties<T: DeserializeOwned>(map: Map<String, Value>) -> PortResult<T> {
    serde_json::from_value(Value::Object(map))
        .map_err(|e| PortError::Unexpected(format!("malformed stored object: {e}")))
}

/// Moves a nested property into a JSON text property, or back.
fn pack_json(map: &mut Map<String, Value>, key: &str) {
    if let Some(value) = map.remove(key) {
        if !value.is_null() {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
}

fn unpack_json(map: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(raw)) = map.remove(key) {
        if let Ok(value) = serde_json::from_str::<Value>(&raw) {
            map.insert(key.to_string(), value);
        }
    }
}

fn rename(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = map.remove(from) {
        map.insert(to.to_string(), value);
    }
}

fn goal_properties(goal: &ResearchGoal) -> PortResult<Map<String, Value>> {
    let mut map = to_properties(goal)?;
    rename(&mut map, "id", "goalId");
    Ok(map)
}

fn goal_from(value: Value) -> PortResult<ResearchGoal> {
    let mut map = strip_nulls(value);
    rename(&mut map, "goalId", "id");
    from_properties(map)
}

fn plan_properties(plan: &InterviewPlan) -> PortResult<Map<String, Value>> {
    let mut map = to_properties(plan)?;
    pack_json(&mut map, "questions");
    pack_json(&mut map, "followUps");
    Ok(map)
}

fn plan_from(value: Value) -> PortResult<InterviewPlan> {
    let mut map = strip_nulls(value);
    unpack_json(&mut map, "questions");
    unpack_json(&mut map, "followUps");
    from_properties(map)
}

fn session_properties(session: &InterviewSession) -> PortResult<Map<String, Value>> {
    let mut map = to_properties(session)?;
    pack_json(&mut map, "transcript");
    pack_json(&mut map, "psychometricProfile");
    Ok(map)
}

fn session_from(value: Value) -> PortResult<InterviewSession> {
    let mut map = strip_nulls(value);
    unpack_json(&mut map, "transcript");
    unpack_json(&mut map, "psychometricProfile");
    from_properties(map)
}

fn chunk_properties(session_id: &str, chunk: &TranscriptChunk) -> PortResult<Map<String, Value>> {
    let mut map = to_properties(chunk)?;
    map.insert("sessionId".to_string(), json!(session_id));
    Ok(map)
}

fn chunk_from(value: Value) -> PortResult<TranscriptChunk> {
    let mut map = strip_nulls(value);
    map.remove("sessionId");
    from_properties(map)
}

fn plain_from<T: DeserializeOwned>(value: Value) -> PortResult<T> {
    from_properties(strip_nulls(value))
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct WeaviateAdapter {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl WeaviateAdapter {
    pub fn new(http: reqwest::Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
        }
    }

    fn url(&self, path: &str) -> PortResult<String> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| PortError::Configuration("WEAVIATE_URL".to_string()))?;
        Ok(format!("{base}{path}"))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> PortResult<Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("network error calling Weaviate: {e}")))
    }

    async fn expect_success(response: Response) -> PortResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => PortError::NotFound(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
            _ => PortError::Upstream {
                status: status.as_u16(),
                message: body,
            },
        })
    }

    async fn read_json(response: Response) -> PortResult<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|e| PortError::Unexpected(format!("unreadable Weaviate response: {e}")))
    }

    /// Runs a GraphQL `Get` and returns the objects of the queried class.
    pub async fn get(&self, query: &GetQuery) -> PortResult<Vec<Value>> {
        let graphql = query.render()?;
        debug!(class = query.class, "Running Weaviate query");
        let response = self
            .send(
                self.http
                    .post(self.url("/v1/graphql")?)
                    .json(&json!({ "query": graphql })),
            )
            .await?;
        let body = Self::read_json(Self::expect_success(response).await?).await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(PortError::Upstream {
                    status: 500,
                    message,
                });
            }
        }

        Ok(body
            .pointer(&format!("/data/Get/{}", query.class))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Creates the object, or replaces it when the id already exists.
    async fn upsert_object(
        &self,
        class_name: &str,
        id: Uuid,
        properties: Map<String, Value>,
        vector: Option<Vec<f32>>,
    ) -> PortResult<()> {
        let mut body = json!({
            "class": class_name,
            "id": id.to_string(),
            "properties": Value::Object(properties),
        });
        if let Some(vector) = vector {
            body["vector"] = json!(vector);
        }

        let response = self
            .send(self.http.post(self.url("/v1/objects")?).json(&body))
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY && text.contains("already exists") {
            debug!(class = class_name, %id, "Object exists, replacing");
            return self.replace_object(class_name, id, body).await;
        }
        Err(PortError::Upstream {
            status: status.as_u16(),
            message: text,
        })
    }

    async fn replace_object(&self, class_name: &str, id: Uuid, body: Value) -> PortResult<()> {
        let url = self.url(&format!("/v1/objects/{class_name}/{id}"))?;
        let response = self.send(self.http.put(url).json(&body)).await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn get_object(&self, class_name: &str, id: Uuid) -> PortResult<Value> {
        let url = self.url(&format!("/v1/objects/{class_name}/{id}"))?;
        let response = self.send(self.http.get(url)).await?;
        let body = Self::read_json(Self::expect_success(response).await?).await?;
        Ok(body.get("properties").cloned().unwrap_or(Value::Null))
    }

    async fn delete_object(&self, class_name: &str, id: Uuid) -> PortResult<()> {
        let url = self.url(&format!("/v1/objects/{class_name}/{id}"))?;
        let response = self.send(self.http.delete(url)).await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn delete_where(&self, class_name: &str, path: &str, value: &str) -> PortResult<()> {
        let body = json!({
            "match": {
                "class": class_name,
                "where": { "path": [path], "operator": "Equal", "valueText": value },
            }
        });
        let response = self
            .send(self.http.delete(self.url("/v1/batch/objects")?).json(&body))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

//=========================================================================================
// `InterviewRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl InterviewRepository for WeaviateAdapter {
    async fn ensure_schema(&self) -> PortResult<Vec<String>> {
        let response = self.send(self.http.get(self.url("/v1/schema")?)).await?;
        let body = Self::read_json(Self::expect_success(response).await?).await?;
        let existing: Vec<String> = body
            .get("classes")
            .and_then(Value::as_array)
            .map(|classes| {
                classes
                    .iter()
                    .filter_map(|c| c.get("class").and_then(Value::as_str).map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let mut created = Vec::new();
        for def in SCHEMA.iter().filter(|d| !existing.iter().any(|e| e == d.name)) {
            let response = self
                .send(
                    self.http
                        .post(self.url("/v1/schema")?)
                        .json(&class_definition(def)),
                )
                .await?;
            Self::expect_success(response).await?;
            info!(class = def.name, "Created Weaviate class");
            created.push(def.name.to_string());
        }
        Ok(created)
    }

    async fn create_research_goal(&self, goal: ResearchGoal) -> PortResult<ResearchGoal> {
        self.upsert_object(
            "ResearchGoal",
            goal_object_id(&goal.id),
            goal_properties(&goal)?,
            None,
        )
        .await?;
        Ok(goal)
    }

    async fn get_research_goal(&self, goal_id: &str) -> PortResult<ResearchGoal> {
        let value = self
            .get_object("ResearchGoal", goal_object_id(goal_id))
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => PortError::NotFound(format!("research goal {goal_id}")),
                other => other,
            })?;
        goal_from(value)
    }

    async fn list_research_goals(&self, status: Option<GoalStatus>) -> PortResult<Vec<ResearchGoal>> {
        let mut query = GetQuery::new("ResearchGoal");
        query.filter = status.map(|s| Filter::text_equal("status", s.as_str()));
        query.sort = Some(("createdAt", false));
        query.limit = Some(LIST_LIMIT);
        self.get(&query).await?.into_iter().map(goal_from).collect()
    }

    async fn update_research_goal(&self, goal: ResearchGoal) -> PortResult<()> {
        let id = goal_object_id(&goal.id);
        let body = json!({
            "class": "ResearchGoal",
            "id": id.to_string(),
            "properties": Value::Object(goal_properties(&goal)?),
        });
        self.replace_object("ResearchGoal", id, body).await
    }

    async fn search_research_goals(&self, query: &str, limit: usize) -> PortResult<Vec<ResearchGoal>> {
        let mut get = GetQuery::new("ResearchGoal");
        get.near_text = Some(query.to_string());
        get.limit = Some(limit);
        self.get(&get).await?.into_iter().map(goal_from).collect()
    }

    async fn save_interview_plan(&self, plan: InterviewPlan) -> PortResult<()> {
        let id = object_id(&format!("plan:{}", plan.plan_id));
        self.upsert_object("InterviewPlan", id, plan_properties(&plan)?, None)
            .await
    }

    async fn get_plans_for_goal(&self, goal_id: &str) -> PortResult<Vec<InterviewPlan>> {
        let mut query = GetQuery::new("InterviewPlan");
        query.filter = Some(Filter::text_equal("researchGoalId", goal_id));
        query.limit = Some(LIST_LIMIT);
        let mut plans: Vec<InterviewPlan> = self
            .get(&query)
            .await?
            .into_iter()
            .map(plan_from)
            .collect::<PortResult<_>>()?;
        plans.sort_by_key(|p| p.version);
        Ok(plans)
    }

    async fn upsert_session(&self, session: &InterviewSession) -> PortResult<()> {
        self.upsert_object(
            "InterviewSession",
            session_object_id(&session.session_id),
            session_properties(session)?,
            None,
        )
        .await
    }

    async fn get_session(&self, session_id: &str) -> PortResult<InterviewSession> {
        let value = self
            .get_object("InterviewSession", session_object_id(session_id))
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => PortError::NotFound(format!("session {session_id}")),
                other => other,
            })?;
        session_from(value)
    }

    async fn list_sessions(&self, filter: SessionFilter) -> PortResult<Vec<InterviewSession>> {
        let mut query = GetQuery::new("InterviewSession");
        query.filter = filter.status.map(|s| Filter::text_equal("status", s.as_str()));
        query.sort = Some(("createdAt", false));
        query.limit = Some(filter.limit.unwrap_or(LIST_LIMIT));
        self.get(&query).await?.into_iter().map(session_from).collect()
    }

    async fn delete_session(&self, session_id: &str) -> PortResult<()> {
        self.delete_object("InterviewSession", session_object_id(session_id))
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => PortError::NotFound(format!("session {session_id}")),
                other => other,
            })?;
        for class_name in ["TranscriptChunk", "SummaryChunk", "PsychometricProfile"] {
            if let Err(e) = self.delete_where(class_name, "sessionId", session_id).await {
                warn!(session_id, class = class_name, error = %e, "Failed to delete dependent objects");
            }
        }
        Ok(())
    }

    async fn save_transcript_chunks(
        &self,
        session_id: &str,
        chunks: Vec<EmbeddedChunk>,
    ) -> PortResult<usize> {
        let mut stored = 0;
        for EmbeddedChunk { chunk, vector } in chunks {
            let id = chunk_object_id(session_id, &chunk);
            self.upsert_object(
                "TranscriptChunk",
                id,
                chunk_properties(session_id, &chunk)?,
                vector,
            )
            .await?;
            stored += 1;
        }
        debug!(session_id, stored, "Stored transcript chunks");
        Ok(stored)
    }

    async fn get_transcript_chunks(&self, session_id: &str) -> PortResult<Vec<TranscriptChunk>> {
        let mut query = GetQuery::new("TranscriptChunk");
        query.filter = Some(Filter::text_equal("sessionId", session_id));
        query.limit = Some(CHUNK_LIMIT);
        let mut chunks: Vec<TranscriptChunk> = self
            .get(&query)
            .await?
            .into_iter()
            .map(chunk_from)
            .collect::<PortResult<_>>()?;
        chunks.sort_by_key(|c| (c.turn_index, c.part_number));
        Ok(chunks)
    }

    async fn search_transcript_chunks(
        &self,
        query: &str,
        limit: usize,
    ) -> PortResult<Vec<TranscriptChunk>> {
        let mut get = GetQuery::new("TranscriptChunk");
        get.near_text = Some(query.to_string());
        get.limit = Some(limit);
        self.get(&get).await?.into_iter().map(chunk_from).collect()
    }

    async fn save_summary_chunk(&self, summary: SummaryChunk) -> PortResult<()> {
        let id = object_id(&format!("summary:{}", summary.summary_id));
        self.upsert_object("SummaryChunk", id, to_properties(&summary)?, None)
            .await
    }

    async fn get_summary_chunks(&self, session_id: &str) -> PortResult<Vec<SummaryChunk>> {
        let mut query = GetQuery::new("SummaryChunk");
        query.filter = Some(Filter::text_equal("sessionId", session_id));
        query.sort = Some(("createdAt", true));
        query.limit = Some(LIST_LIMIT);
        self.get(&query).await?.into_iter().map(plain_from).collect()
    }

    async fn upsert_psychometric_profile(&self, profile: PsychometricProfile) -> PortResult<()> {
        let id = profile_object_id(&profile.session_id);
        self.upsert_object("PsychometricProfile", id, to_properties(&profile)?, None)
            .await
    }

    async fn get_psychometric_profile(&self, session_id: &str) -> PortResult<PsychometricProfile> {
        let value = self
            .get_object("PsychometricProfile", profile_object_id(session_id))
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => {
                    PortError::NotFound(format!("psychometric profile for {session_id}"))
                }
                other => other,
            })?;
        plain_from(value)
    }

    async fn save_evaluation_metric(&self, metric: EvaluationMetric) -> PortResult<()> {
        let id = metric_object_id(&metric.metric_id);
        self.upsert_object("EvaluationMetric", id, to_properties(&metric)?, None)
            .await?;
        debug!(metric_id = %metric.metric_id, session_id = %metric.session_id, "Stored evaluation metric");
        Ok(())
    }

    async fn get_evaluation_metrics(
        &self,
        session_id: &str,
        metric_type: Option<&str>,
        limit: usize,
    ) -> PortResult<Vec<EvaluationMetric>> {
        let session = Filter::text_equal("sessionId", session_id);
        let mut query = GetQuery::new("EvaluationMetric");
        query.filter = Some(match metric_type {
            Some(kind) => Filter::All(vec![session, Filter::text_equal("metricType", kind)]),
            None => session,
        });
        query.sort = Some(("createdAt", false));
        query.limit = Some(limit);
        self.get(&query).await?.into_iter().map(plain_from).collect()
    }
}
