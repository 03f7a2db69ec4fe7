#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use archive_engine::{ApiError, Clock, Params, RemoteApi};
use serde_json::{json, Value};
use tokio::time::Instant;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(archive_logging::initialize_for_tests);
}

pub fn fixed_clock() -> Clock {
    Arc::new(|| "2024-05-01T12:00:00Z".to_string())
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub params: Params,
    pub at: Instant,
}

type Handler = Box<dyn Fn(&str, &Params) -> Result<Value, ApiError> + Send + Sync>;

/// In-memory `RemoteApi` that records every call it receives.
pub struct FakeApi {
    handler: Handler,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl FakeApi {
    pub fn new(
        handler: impl Fn(&str, &Params) -> Result<Value, ApiError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    pub fn start_times(&self) -> Vec<Instant> {
        let mut times: Vec<Instant> = self.calls.lock().unwrap().iter().map(|c| c.at).collect();
        times.sort();
        times
    }
}

#[async_trait::async_trait]
impl RemoteApi for FakeApi {
    async fn call(&self, method: &str, params: &Params) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push(Call {
            method: method.to_string(),
            params: params.clone(),
            at: Instant::now(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.handler)(method, params)
    }
}

fn param(params: &Params, key: &str) -> i64 {
    params
        .get(key)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn slice(items: &[Value], params: &Params) -> Value {
    let offset = param(params, "offset").max(0) as usize;
    let count = param(params, "count").max(0) as usize;
    let page: Vec<Value> = items.iter().skip(offset).take(count).cloned().collect();
    json!({"count": items.len(), "items": page})
}

/// A scripted VK account: conversations, histories, walls and their
/// comments and likes, plus per-target failures.
#[derive(Debug, Clone, Default)]
pub struct World {
    pub conversations: Vec<Value>,
    pub profiles: Vec<Value>,
    /// Newest first, like the remote.
    pub histories: HashMap<i64, Vec<Value>>,
    pub groups: HashMap<String, Value>,
    pub walls: HashMap<i64, Vec<Value>>,
    pub comments: HashMap<(i64, i64), Vec<Value>>,
    /// `(owner, post, root comment)` to every reply in the thread.
    pub threads: HashMap<(i64, i64, i64), Vec<Value>>,
    pub likes: HashMap<(i64, i64), Vec<Value>>,
    /// `(method, peer or owner id)` to the error it fails with.
    pub failures: HashMap<(String, i64), ApiError>,
}

impl World {
    pub fn add_user_dialog(&mut self, peer_id: i64, first: &str, last: &str, messages: usize) {
        self.conversations
            .push(json!({"conversation": {"peer": {"id": peer_id, "type": "user"}}}));
        self.profiles
            .push(json!({"id": peer_id, "first_name": first, "last_name": last}));
        let history = (1..=messages as i64)
            .rev()
            .map(|id| json!({"id": id, "date": 1_700_000_000 + id, "from_id": peer_id, "text": format!("message {id}")}))
            .collect();
        self.histories.insert(peer_id, history);
    }

    pub fn add_community(&mut self, id: i64, name: &str, posts: usize) {
        self.groups.insert(
            id.to_string(),
            json!({"id": id, "name": name, "screen_name": format!("club{id}"), "members_count": 1000, "is_closed": 0}),
        );
        let owner = -id;
        let wall = (1..=posts as i64)
            .rev()
            .map(|post_id| {
                json!({
                    "id": post_id,
                    "owner_id": owner,
                    "from_id": owner,
                    "date": 1_600_000_000 + post_id,
                    "text": format!("post {post_id}"),
                    "likes": {"count": 2, "user_likes": 0},
                    "reposts": {"count": 1},
                    "views": {"count": 50}
                })
            })
            .collect();
        self.walls.insert(owner, wall);
    }

    pub fn fail(&mut self, method: &str, id: i64, err: ApiError) {
        self.failures.insert((method.to_string(), id), err);
    }

    fn failure(&self, method: &str, id: i64) -> Result<(), ApiError> {
        match self.failures.get(&(method.to_string(), id)) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn respond(&self, method: &str, params: &Params) -> Result<Value, ApiError> {
        match method {
            "users.get" => Ok(json!([{"id": 1, "first_name": "Me"}])),
            "messages.getConversations" => {
                let mut page = slice(&self.conversations, params);
                page["profiles"] = Value::Array(self.profiles.clone());
                Ok(page)
            }
            "messages.getHistory" => {
                let peer_id = param(params, "peer_id");
                self.failure(method, peer_id)?;
                let history = self.histories.get(&peer_id).cloned().unwrap_or_default();
                Ok(slice(&history, params))
            }
            "groups.getById" => {
                let key = params.get("group_id").unwrap_or_default();
                match self.groups.get(key) {
                    Some(group) => Ok(json!([group])),
                    None => Err(ApiError::Remote {
                        code: 100,
                        message: "group_id is invalid".into(),
                    }),
                }
            }
            "wall.get" => {
                let owner = param(params, "owner_id");
                self.failure(method, owner)?;
                let wall = self.walls.get(&owner).cloned().unwrap_or_default();
                Ok(slice(&wall, params))
            }
            "wall.getComments" => {
                let owner = param(params, "owner_id");
                self.failure(method, owner)?;
                let post = param(params, "post_id");
                if params.get("comment_id").is_some() {
                    let key = (owner, post, param(params, "comment_id"));
                    let replies = self.threads.get(&key).cloned().unwrap_or_default();
                    return Ok(slice(&replies, params));
                }
                let comments = self.comments.get(&(owner, post)).cloned().unwrap_or_default();
                let mut page = slice(&comments, params);
                page["current_level_count"] = json!(comments.len());
                Ok(page)
            }
            "likes.getList" => {
                let owner = param(params, "owner_id");
                self.failure(method, owner)?;
                let key = (owner, param(params, "item_id"));
                let likes = self.likes.get(&key).cloned().unwrap_or_default();
                Ok(slice(&likes, params))
            }
            other => Err(ApiError::Remote {
                code: 3,
                message: format!("unknown method {other}"),
            }),
        }
    }

    pub fn into_api(self) -> FakeApi {
        FakeApi::new(move |method, params| self.respond(method, params))
    }
}
