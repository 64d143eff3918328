//! In-memory journal server speaking the sync wire protocol.

#![allow(dead_code)]

use journalsync_core::sync::models::{EntryJson, JournalJson, MemberJson, UserInfoJson};
use journalsync_core::sync::{ApiClient, Body, HttpRequest, HttpResponse, Method, Transport, TransportError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct State {
    passwords: HashMap<String, String>,
    tokens: HashMap<String, String>,
    journals: Vec<JournalJson>,
    members: HashMap<String, Vec<MemberJson>>,
    entries: HashMap<String, Vec<EntryJson>>,
    user_info: HashMap<String, UserInfoJson>,
    offline: bool,
    issued: u32,
    requests: usize,
}

#[derive(Default)]
pub struct MemoryServer {
    state: Mutex<State>,
}

fn json<T: Serialize>(status: u16, body: &T) -> HttpResponse {
    HttpResponse::new(status, serde_json::to_vec(body).unwrap())
}

fn detail(status: u16, message: &str) -> HttpResponse {
    json(status, &serde_json::json!({ "detail": message }))
}

fn empty(status: u16) -> HttpResponse {
    HttpResponse::new(status, Vec::new())
}

fn body<T: serde::de::DeserializeOwned>(request: &HttpRequest) -> Option<T> {
    match &request.body {
        Some(Body::Json(bytes)) => serde_json::from_slice(bytes).ok(),
        _ => None,
    }
}

fn query<'a>(request: &'a HttpRequest, key: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl MemoryServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn client(self: &Arc<Self>) -> ApiClient {
        ApiClient::new(self.clone())
    }

    pub fn add_user(&self, username: &str, password: &str) {
        self.state()
            .passwords
            .insert(username.to_string(), password.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn request_count(&self) -> usize {
        self.state().requests
    }

    pub fn journal_uids(&self) -> Vec<String> {
        self.state().journals.iter().map(|j| j.uid.clone()).collect()
    }

    pub fn stored_journal(&self, uid: &str) -> Option<JournalJson> {
        self.state().journals.iter().find(|j| j.uid == uid).cloned()
    }

    /// Mutate a stored journal behind the clients' back.
    pub fn tamper_journal(&self, uid: &str, f: impl FnOnce(&mut JournalJson)) {
        let mut state = self.state();
        if let Some(journal) = state.journals.iter_mut().find(|j| j.uid == uid) {
            f(journal);
        }
    }

    pub fn tamper_entry(&self, journal_uid: &str, index: usize, f: impl FnOnce(&mut EntryJson)) {
        let mut state = self.state();
        if let Some(entry) = state
            .entries
            .get_mut(journal_uid)
            .and_then(|entries| entries.get_mut(index))
        {
            f(entry);
        }
    }

    pub fn tamper_user_info(&self, owner: &str, f: impl FnOnce(&mut UserInfoJson)) {
        if let Some(info) = self.state().user_info.get_mut(owner) {
            f(info);
        }
    }

    fn route(&self, request: &HttpRequest) -> HttpResponse {
        let mut state = self.state();

        if request.path == "api-token-auth/" {
            return Self::login(&mut state, request);
        }

        let user = match request
            .authorization
            .as_deref()
            .and_then(|h| h.strip_prefix("Token "))
            .and_then(|t| state.tokens.get(t))
        {
            Some(user) => user.clone(),
            None => return detail(401, "Invalid token."),
        };

        let segments: Vec<&str> = request.path.trim_end_matches('/').split('/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Post, ["api", "logout"]) => {
                let token = request
                    .authorization
                    .as_deref()
                    .and_then(|h| h.strip_prefix("Token "))
                    .unwrap_or_default()
                    .to_string();
                state.tokens.remove(&token);
                empty(204)
            }
            (_, ["api", "v1", "user", rest @ ..]) => Self::user_info(&mut state, request, &user, rest),
            (_, ["api", "v1", "journals"]) => Self::journals(&mut state, request, &user),
            (_, ["api", "v1", "journals", uid]) => Self::journal(&mut state, request, &user, uid),
            (_, ["api", "v1", "journals", uid, "members", rest @ ..]) => {
                Self::members(&mut state, request, &user, uid, rest)
            }
            (_, ["api", "v1", "journals", uid, "entries"]) => {
                Self::entries(&mut state, request, &user, uid)
            }
            _ => detail(404, "Not found."),
        }
    }

    fn login(state: &mut State, request: &HttpRequest) -> HttpResponse {
        let fields = match &request.body {
            Some(Body::Form(fields)) => fields,
            _ => return detail(400, "Expected form body"),
        };
        let field = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        let (username, password) = (field("username"), field("password"));

        if state.passwords.get(&username) != Some(&password) {
            return json(
                400,
                &serde_json::json!({ "non_field_errors": ["Unable to log in with provided credentials."] }),
            );
        }

        state.issued += 1;
        let token = format!("token-{}-{}", username, state.issued);
        state.tokens.insert(token.clone(), username);
        json(200, &serde_json::json!({ "token": token }))
    }

    fn visible(state: &State, user: &str, journal: &JournalJson) -> Option<JournalJson> {
        if journal.owner.as_deref() == Some(user) {
            return Some(journal.clone());
        }
        let member = state
            .members
            .get(&journal.uid)?
            .iter()
            .find(|m| m.user == user)?;
        let mut shared = journal.clone();
        shared.key = Some(member.key.clone());
        shared.key_tag = None;
        shared.read_only = true;
        Some(shared)
    }

    fn journals(state: &mut State, request: &HttpRequest, user: &str) -> HttpResponse {
        match request.method {
            Method::Get => {
                let visible: Vec<JournalJson> = state
                    .journals
                    .iter()
                    .filter_map(|j| Self::visible(state, user, j))
                    .collect();
                json(200, &visible)
            }
            Method::Post => {
                let mut journal: JournalJson = match body(request) {
                    Some(journal) => journal,
                    None => return detail(400, "Malformed journal"),
                };
                if state.journals.iter().any(|j| j.uid == journal.uid) {
                    return detail(409, "Journal with this uid already exists.");
                }
                journal.owner = Some(user.to_string());
                journal.last_uid = None;
                state.journals.push(journal);
                empty(201)
            }
            _ => detail(405, "Method not allowed."),
        }
    }

    fn journal(state: &mut State, request: &HttpRequest, user: &str, uid: &str) -> HttpResponse {
        let index = match state.journals.iter().position(|j| j.uid == uid) {
            Some(index) => index,
            None => return detail(404, "Not found."),
        };
        let owned = state.journals[index].owner.as_deref() == Some(user);

        match request.method {
            Method::Get => match Self::visible(state, user, &state.journals[index]) {
                Some(journal) => json(200, &journal),
                None => detail(404, "Not found."),
            },
            Method::Put if owned => {
                let update: JournalJson = match body(request) {
                    Some(journal) => journal,
                    None => return detail(400, "Malformed journal"),
                };
                let journal = &mut state.journals[index];
                journal.version = update.version;
                journal.content = update.content;
                journal.key = update.key;
                journal.key_tag = update.key_tag;
                empty(200)
            }
            Method::Delete if owned => {
                state.journals.remove(index);
                state.members.remove(uid);
                state.entries.remove(uid);
                empty(204)
            }
            _ => detail(403, "You do not have permission to perform this action."),
        }
    }

    fn members(
        state: &mut State,
        request: &HttpRequest,
        user: &str,
        uid: &str,
        rest: &[&str],
    ) -> HttpResponse {
        match state.journals.iter().find(|j| j.uid == uid) {
            Some(journal) if journal.owner.as_deref() == Some(user) => {}
            Some(_) => return detail(403, "You do not have permission to perform this action."),
            None => return detail(404, "Not found."),
        }

        let members = state.members.entry(uid.to_string()).or_default();
        match (request.method, rest) {
            (Method::Get, []) => json(200, &*members),
            (Method::Post, []) => {
                let member: MemberJson = match body(request) {
                    Some(member) => member,
                    None => return detail(400, "Malformed member"),
                };
                if members.iter().any(|m| m.user == member.user) {
                    return detail(409, "Already a member.");
                }
                members.push(member);
                empty(201)
            }
            (Method::Delete, [member]) => {
                let before = members.len();
                members.retain(|m| m.user != *member);
                if members.len() == before {
                    detail(404, "Not found.")
                } else {
                    empty(204)
                }
            }
            _ => detail(405, "Method not allowed."),
        }
    }

    fn entries(state: &mut State, request: &HttpRequest, user: &str, uid: &str) -> HttpResponse {
        let index = match state.journals.iter().position(|j| j.uid == uid) {
            Some(index) => index,
            None => return detail(404, "Not found."),
        };
        if Self::visible(state, user, &state.journals[index]).is_none() {
            return detail(404, "Not found.");
        }

        let log = state.entries.entry(uid.to_string()).or_default();
        let last = query(request, "last");

        match request.method {
            Method::Get => {
                let start = match last {
                    None => 0,
                    Some(last) => match log.iter().position(|e| e.uid == last) {
                        Some(pos) => pos + 1,
                        None => return detail(400, "Unknown last entry."),
                    },
                };
                let limit = query(request, "limit")
                    .and_then(|l| l.parse::<usize>().ok())
                    .unwrap_or(usize::MAX);
                let page: Vec<&EntryJson> = log.iter().skip(start).take(limit).collect();
                json(200, &page)
            }
            Method::Post => {
                let head = log.last().map(|e| e.uid.as_str());
                if head != last {
                    return detail(409, "Journal has changed since the given last entry.");
                }
                let new_entries: Vec<EntryJson> = match body(request) {
                    Some(entries) => entries,
                    None => return detail(400, "Malformed entries"),
                };
                log.extend(new_entries);
                let head = log.last().map(|e| e.uid.clone());
                state.journals[index].last_uid = head;
                empty(201)
            }
            _ => detail(405, "Method not allowed."),
        }
    }

    fn user_info(state: &mut State, request: &HttpRequest, user: &str, rest: &[&str]) -> HttpResponse {
        match (request.method, rest) {
            (Method::Get, [owner]) => match state.user_info.get(*owner) {
                Some(info) => json(200, info),
                None => detail(404, "Not found."),
            },
            (Method::Post, []) => {
                let mut info: UserInfoJson = match body(request) {
                    Some(info) => info,
                    None => return detail(400, "Malformed user info"),
                };
                if state.user_info.contains_key(user) {
                    return detail(409, "User info already exists.");
                }
                info.owner = user.to_string();
                state.user_info.insert(user.to_string(), info);
                empty(201)
            }
            (Method::Put, [owner]) if *owner == user => {
                let info: UserInfoJson = match body(request) {
                    Some(info) => info,
                    None => return detail(400, "Malformed user info"),
                };
                match state.user_info.get_mut(user) {
                    Some(stored) => {
                        stored.version = info.version;
                        stored.pubkey = info.pubkey;
                        stored.content = info.content;
                        empty(200)
                    }
                    None => detail(404, "Not found."),
                }
            }
            (Method::Delete, [owner]) if *owner == user => match state.user_info.remove(user) {
                Some(_) => empty(204),
                None => detail(404, "Not found."),
            },
            _ => detail(403, "You do not have permission to perform this action."),
        }
    }
}

impl Transport for MemoryServer {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        {
            let mut state = self.state();
            state.requests += 1;
            if state.offline {
                return Err(TransportError("connection refused".to_string()));
            }
        }
        Ok(self.route(request))
    }
}
