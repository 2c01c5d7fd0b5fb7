//! The chat console's state machine.
//!
//! `Console` owns the conversation log, draft prompt, model selection,
//! include-context toggle and toast. Operations that reach the backend are
//! split in two: a synchronous half that validates input and updates local
//! state (the optimistic user entry), and a returned `PendingRequest` the
//! caller drives. When it settles, the caller hands the `Outcome` back to
//! `apply`. This keeps all mutation on one owner while requests run elsewhere.

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;

use crate::api::Backend;
use crate::error::ApiResult;
use crate::model::{AskRequest, ChatRequest, ChatResponse, FitnessContext, McpTool, ModelOption};
use crate::query::{Mutation, QueryClient, QueryKey};
use crate::settings::SettingsStore;
use crate::state::ChatEntry;

/// A settled backend call, ready to fold into the console
#[derive(Debug)]
pub enum Outcome {
    Chat(ApiResult<ChatResponse>),
    Mcp(ApiResult<Value>),
    FitnessSummary(ApiResult<Value>),
}

pub type PendingRequest = BoxFuture<'static, Outcome>;

pub struct Console {
    settings: Arc<dyn SettingsStore>,
    queries: QueryClient,
    chat: Mutation<ChatRequest, ChatResponse>,
    ask: Mutation<AskRequest, Value>,
    summary: Mutation<(), Value>,

    messages: Vec<ChatEntry>,
    draft: String,
    selected_model: Option<String>,
    include_context: bool,
    toast: Option<String>,
}

impl Console {
    pub fn new(
        backend: Arc<dyn Backend>,
        settings: Arc<dyn SettingsStore>,
        include_context: bool,
    ) -> Self {
        let queries = QueryClient::new(Arc::clone(&backend));

        let b = Arc::clone(&backend);
        let context = queries.context.clone();
        let chat = Mutation::new("chat", move |request: ChatRequest| {
            let b = Arc::clone(&b);
            async move { b.chat(&request).await }.boxed()
        })
        .on_success(move |_| context.invalidate());

        let b = Arc::clone(&backend);
        let ask = Mutation::new("ask_gemini", move |request: AskRequest| {
            let b = Arc::clone(&b);
            async move { b.ask_gemini(&request).await }.boxed()
        });

        let b = backend;
        let summary = Mutation::new("fitness_summary", move |_: ()| {
            let b = Arc::clone(&b);
            async move { b.fitness_summary().await }.boxed()
        });

        let selected_model = settings.selected_model();
        if let Some(model) = &selected_model {
            tracing::debug!(model = %model, "restored persisted model");
        }

        Self {
            settings,
            queries,
            chat,
            ask,
            summary,
            messages: Vec::new(),
            draft: String::new(),
            selected_model,
            include_context,
            toast: None,
        }
    }

    /// Begin the initial model, context and tool fetches concurrently.
    pub fn start(&self) {
        drop(self.queries.models.ensure());
        drop(self.queries.context.ensure());
        drop(self.queries.tools.ensure());
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    /// React to a query settling or being invalidated.
    pub fn sync(&mut self, key: QueryKey) {
        match key {
            QueryKey::Models => self.reconcile_selection(),
            QueryKey::Context | QueryKey::Tools => {}
        }
        self.queries.ensure_stale();
    }

    fn reconcile_selection(&mut self) {
        if self.selected_model.is_some() {
            return;
        }
        let first = self
            .queries
            .models
            .data()
            .and_then(|models| models.first().map(|m| m.name.clone()));
        if let Some(name) = first {
            tracing::info!(model = %name, "defaulting to first available model");
            self.set_selected(name);
        }
    }

    fn set_selected(&mut self, name: String) {
        if let Err(e) = self.settings.save_selected_model(&name) {
            tracing::warn!(error = %e, "could not persist model selection");
        }
        self.selected_model = Some(name);
    }

    // Accessors

    pub fn messages(&self) -> &[ChatEntry] {
        &self.messages
    }

    pub fn models(&self) -> Vec<ModelOption> {
        self.queries.models.data().unwrap_or_default()
    }

    pub fn tools(&self) -> Vec<McpTool> {
        self.queries.tools.data().unwrap_or_default()
    }

    pub fn context(&self) -> Option<FitnessContext> {
        self.queries.context.data()
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    /// Select a model by identifier. Unknown names are refused once the list is loaded.
    pub fn select_model(&mut self, name: &str) -> bool {
        if let Some(models) = self.queries.models.data() {
            if !models.iter().any(|m| m.name == name) {
                return false;
            }
        }
        if self.selected_model.as_deref() != Some(name) {
            self.set_selected(name.to_string());
        }
        true
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut String {
        &mut self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn include_context(&self) -> bool {
        self.include_context
    }

    pub fn toggle_include_context(&mut self) {
        self.include_context = !self.include_context;
    }

    pub fn toast(&self) -> Option<&str> {
        self.toast.as_deref()
    }

    pub fn dismiss_toast(&mut self) {
        self.toast = None;
    }

    pub fn is_chat_pending(&self) -> bool {
        self.chat.is_pending()
    }

    pub fn is_ask_pending(&self) -> bool {
        self.ask.is_pending()
    }

    pub fn is_summary_pending(&self) -> bool {
        self.summary.is_pending()
    }

    /// A chat or MCP ask is in flight
    pub fn is_sending(&self) -> bool {
        self.chat.is_pending() || self.ask.is_pending()
    }

    pub fn can_submit(&self) -> bool {
        !self.draft.trim().is_empty() && self.selected_model.is_some() && !self.is_sending()
    }

    pub fn context_summary(&self) -> String {
        match self.queries.context.data() {
            Some(context) => context.summary(),
            None => "No context loaded".to_string(),
        }
    }

    // Actions

    /// Send the draft to `/ai/chat`. Returns `None` and leaves state untouched
    /// when the draft is blank, no model is selected, or a send is in flight.
    pub fn submit_chat(&mut self) -> Option<PendingRequest> {
        let (prompt, model) = self.take_prompt()?;
        self.messages.push(ChatEntry::user(prompt.clone()));

        tracing::info!(model = %model, include_context = self.include_context, "sending chat");
        let request = ChatRequest::single(&prompt, &model, self.include_context);
        let call = self.chat.mutate(request);
        Some(async move { Outcome::Chat(call.await) }.boxed())
    }

    /// Send the draft through the `ask_gemini` MCP tool.
    pub fn submit_mcp(&mut self) -> Option<PendingRequest> {
        let (prompt, model) = self.take_prompt()?;
        self.messages.push(ChatEntry::user(format!("[MCP] {}", prompt)));

        tracing::info!(model = %model, include_context = self.include_context, "sending MCP ask");
        let request = AskRequest {
            prompt,
            model,
            include_context: self.include_context,
        };
        let call = self.ask.mutate(request);
        Some(async move { Outcome::Mcp(call.await) }.boxed())
    }

    /// Invoke the `fitness_summary` MCP tool.
    pub fn run_fitness_summary(&mut self) -> Option<PendingRequest> {
        if self.summary.is_pending() {
            return None;
        }
        let call = self.summary.mutate(());
        Some(async move { Outcome::FitnessSummary(call.await) }.boxed())
    }

    fn take_prompt(&mut self) -> Option<(String, String)> {
        if !self.can_submit() {
            return None;
        }
        let model = self.selected_model.clone()?;
        let prompt = std::mem::take(&mut self.draft);
        Some((prompt, model))
    }

    pub fn refresh_context(&self) {
        drop(self.queries.context.refetch());
    }

    /// Fold a settled request into the log and toast.
    pub fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Chat(Ok(response)) => {
                let text = if response.text.is_empty() {
                    "(no text)".to_string()
                } else {
                    response.text
                };
                let model = Some(response.model).filter(|m| !m.is_empty());
                self.messages.push(ChatEntry::assistant(text, model));
            }
            Outcome::Chat(Err(e)) => {
                self.toast = Some(e.to_string());
                self.messages.push(ChatEntry::error(format!("Chat failed: {}", e)));
            }
            Outcome::Mcp(Ok(payload)) => {
                self.messages.push(ChatEntry::assistant(pretty_json(&payload), None));
            }
            Outcome::Mcp(Err(e)) => {
                self.toast = Some(e.to_string());
                self.messages.push(ChatEntry::error(format!("MCP request failed: {}", e)));
            }
            Outcome::FitnessSummary(Ok(payload)) => {
                self.messages.push(ChatEntry::assistant(pretty_json(&payload), None));
            }
            Outcome::FitnessSummary(Err(e)) => {
                self.toast = Some(e.to_string());
            }
        }
        self.queries.ensure_stale();
    }
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::settings::MemorySettingsStore;
    use crate::state::ChatRole;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        models: Vec<ModelOption>,
        chat_error: Option<ApiError>,
        ask_error: Option<ApiError>,
        summary_error: Option<ApiError>,
        model_calls: AtomicUsize,
        context_calls: AtomicUsize,
        chat_calls: AtomicUsize,
        tool_calls: AtomicUsize,
        last_chat: Mutex<Option<ChatRequest>>,
        last_ask: Mutex<Option<AskRequest>>,
    }

    impl FakeBackend {
        fn with_models(names: &[&str]) -> Self {
            Self {
                models: names
                    .iter()
                    .map(|n| ModelOption {
                        name: n.to_string(),
                        display_name: String::new(),
                        full_name: format!("models/{}", n),
                    })
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn models(&self) -> ApiResult<Vec<ModelOption>> {
            self.model_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.models.clone())
        }

        async fn context(&self) -> ApiResult<FitnessContext> {
            self.context_calls.fetch_add(1, Ordering::SeqCst);
            Ok(FitnessContext {
                messages: vec!["Strava synced".to_string()],
                ..FitnessContext::default()
            })
        }

        async fn chat(&self, request: &ChatRequest) -> ApiResult<ChatResponse> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_chat.lock().unwrap() = Some(request.clone());
            match &self.chat_error {
                Some(e) => Err(e.clone()),
                None => Ok(ChatResponse {
                    model: request.model.clone(),
                    text: format!("re: {}", request.messages[0].content),
                    used_context: request.include_context,
                }),
            }
        }

        async fn tools(&self) -> ApiResult<Vec<McpTool>> {
            self.tool_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![McpTool {
                name: "fitness_summary".to_string(),
                description: "Return a compact summary".to_string(),
            }])
        }

        async fn fitness_summary(&self) -> ApiResult<Value> {
            match &self.summary_error {
                Some(e) => Err(e.clone()),
                None => Ok(json!({"messages": ["ok"]})),
            }
        }

        async fn ask_gemini(&self, request: &AskRequest) -> ApiResult<Value> {
            *self.last_ask.lock().unwrap() = Some(request.clone());
            match &self.ask_error {
                Some(e) => Err(e.clone()),
                None => Ok(json!({"model": request.model, "text": "via mcp", "usedContext": request.include_context})),
            }
        }
    }

    async fn loaded(backend: Arc<FakeBackend>, settings: Arc<MemorySettingsStore>) -> Console {
        let mut console = Console::new(backend, settings, true);
        console.start();
        console.queries().models.ensure().await.unwrap();
        console.queries().context.ensure().await.unwrap();
        console.sync(QueryKey::Models);
        console
    }

    fn overloaded() -> ApiError {
        ApiError::Status {
            status: 500,
            message: "overloaded".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_model_selected_without_persisted_choice() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let settings = Arc::new(MemorySettingsStore::new());
        let console = loaded(backend, Arc::clone(&settings)).await;

        assert_eq!(console.selected_model(), Some("gemini-pro"));
        assert_eq!(settings.selected_model().as_deref(), Some("gemini-pro"));
    }

    #[tokio::test]
    async fn test_persisted_model_wins() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro", "gemini-flash"]));
        let settings = Arc::new(MemorySettingsStore::with_model("gemini-flash"));
        let console = loaded(backend, settings).await;

        assert_eq!(console.selected_model(), Some("gemini-flash"));
    }

    #[tokio::test]
    async fn test_selection_survives_new_session() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro", "gemini-flash"]));
        let settings = Arc::new(MemorySettingsStore::new());

        let mut console = loaded(Arc::clone(&backend), Arc::clone(&settings)).await;
        assert!(console.select_model("gemini-flash"));
        assert!(!console.select_model("gpt-4"));
        assert_eq!(console.selected_model(), Some("gemini-flash"));
        drop(console);

        let console = loaded(backend, settings).await;
        assert_eq!(console.selected_model(), Some("gemini-flash"));
    }

    #[tokio::test]
    async fn test_empty_model_list_leaves_nothing_selected() {
        let backend = Arc::new(FakeBackend::default());
        let console = loaded(backend, Arc::new(MemorySettingsStore::new())).await;

        assert_eq!(console.selected_model(), None);
        assert!(console.models().is_empty());
    }

    #[tokio::test]
    async fn test_submit_chat_appends_user_then_assistant() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let mut console = loaded(Arc::clone(&backend), Arc::new(MemorySettingsStore::new())).await;

        console.set_draft("How was my week?");
        let pending = console.submit_chat().expect("request issued");

        assert_eq!(console.draft(), "");
        assert_eq!(console.messages(), &[ChatEntry::user("How was my week?")]);
        assert!(console.is_chat_pending());

        console.apply(pending.await);
        assert!(!console.is_chat_pending());

        let messages = console.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, ChatRole::Assistant);
        assert_eq!(messages[1].text, "re: How was my week?");
        assert_eq!(messages[1].model.as_deref(), Some("gemini-pro"));

        let sent = backend.last_chat.lock().unwrap().clone().unwrap();
        assert_eq!(sent, ChatRequest::single("How was my week?", "gemini-pro", true));
        assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_prompt_is_ignored() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let mut console = loaded(Arc::clone(&backend), Arc::new(MemorySettingsStore::new())).await;

        console.set_draft("   \n\t");
        assert!(console.submit_chat().is_none());
        assert!(console.submit_mcp().is_none());

        assert_eq!(console.draft(), "   \n\t");
        assert!(console.messages().is_empty());
        assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_model_is_ignored() {
        let backend = Arc::new(FakeBackend::default());
        let mut console = loaded(Arc::clone(&backend), Arc::new(MemorySettingsStore::new())).await;

        console.set_draft("hello");
        assert!(console.submit_chat().is_none());
        assert_eq!(console.draft(), "hello");
        assert!(console.messages().is_empty());
        assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_chat_shows_toast_and_error_entry() {
        let backend = Arc::new(FakeBackend {
            chat_error: Some(overloaded()),
            ..FakeBackend::with_models(&["gemini-pro"])
        });
        let mut console = loaded(backend, Arc::new(MemorySettingsStore::new())).await;

        console.set_draft("plan my taper");
        let pending = console.submit_chat().unwrap();
        console.apply(pending.await);

        assert_eq!(console.toast(), Some("overloaded"));
        let roles: Vec<ChatRole> = console.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Error]);
        assert_eq!(console.messages()[1].text, "Chat failed: overloaded");

        console.dismiss_toast();
        assert_eq!(console.toast(), None);
    }

    #[tokio::test]
    async fn test_chat_success_refetches_context() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let mut console = loaded(Arc::clone(&backend), Arc::new(MemorySettingsStore::new())).await;
        assert_eq!(backend.context_calls.load(Ordering::SeqCst), 1);

        console.set_draft("and today?");
        let pending = console.submit_chat().unwrap();
        console.apply(pending.await);

        // apply re-reads the invalidated context without a manual refresh
        console.queries().context.ensure().await.unwrap();
        assert_eq!(backend.context_calls.load(Ordering::SeqCst), 2);
        assert!(!console.queries().context.state().is_stale);
    }

    #[tokio::test]
    async fn test_failed_chat_keeps_context_cached() {
        let backend = Arc::new(FakeBackend {
            chat_error: Some(overloaded()),
            ..FakeBackend::with_models(&["gemini-pro"])
        });
        let mut console = loaded(Arc::clone(&backend), Arc::new(MemorySettingsStore::new())).await;

        console.set_draft("hi");
        let pending = console.submit_chat().unwrap();
        console.apply(pending.await);

        console.queries().context.ensure().await.unwrap();
        assert_eq!(backend.context_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_submit_refused_while_sending() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let mut console = loaded(Arc::clone(&backend), Arc::new(MemorySettingsStore::new())).await;

        console.set_draft("first");
        let pending = console.submit_chat().unwrap();

        console.set_draft("second");
        assert!(console.submit_chat().is_none());
        assert!(console.submit_mcp().is_none());
        assert_eq!(console.draft(), "second");
        assert_eq!(console.messages().len(), 1);

        console.apply(pending.await);
        assert!(console.submit_chat().is_some());
    }

    #[tokio::test]
    async fn test_mcp_ask_round_trip() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let mut console = loaded(Arc::clone(&backend), Arc::new(MemorySettingsStore::new())).await;
        console.toggle_include_context();

        console.set_draft("summarize recovery");
        let pending = console.submit_mcp().unwrap();
        assert_eq!(console.messages()[0].text, "[MCP] summarize recovery");
        assert!(console.is_ask_pending());

        console.apply(pending.await);
        let reply = &console.messages()[1];
        assert_eq!(reply.role, ChatRole::Assistant);
        let payload: Value = serde_json::from_str(&reply.text).unwrap();
        assert_eq!(payload["text"], "via mcp");
        assert_eq!(payload["usedContext"], false);

        let sent = backend.last_ask.lock().unwrap().clone().unwrap();
        assert_eq!(sent.prompt, "summarize recovery");
        assert!(!sent.include_context);
    }

    #[tokio::test]
    async fn test_mcp_failure_appends_error_entry() {
        let backend = Arc::new(FakeBackend {
            ask_error: Some(overloaded()),
            ..FakeBackend::with_models(&["gemini-pro"])
        });
        let mut console = loaded(backend, Arc::new(MemorySettingsStore::new())).await;

        console.set_draft("how tired am I?");
        let pending = console.submit_mcp().unwrap();
        console.apply(pending.await);

        let roles: Vec<ChatRole> = console.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Error]);
        assert_eq!(console.messages()[1].text, "MCP request failed: overloaded");
        assert_eq!(console.toast(), Some("overloaded"));
        assert!(!console.is_ask_pending());
    }

    #[tokio::test]
    async fn test_fitness_summary() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let mut console = loaded(backend, Arc::new(MemorySettingsStore::new())).await;

        let pending = console.run_fitness_summary().unwrap();
        assert!(console.is_summary_pending());
        assert!(console.run_fitness_summary().is_none());
        console.apply(pending.await);

        assert_eq!(console.messages().len(), 1);
        assert!(console.messages()[0].text.contains("\"ok\""));
    }

    #[tokio::test]
    async fn test_fitness_summary_failure_toasts_only() {
        let backend = Arc::new(FakeBackend {
            summary_error: Some(ApiError::Transport("connection refused".into())),
            ..FakeBackend::with_models(&["gemini-pro"])
        });
        let mut console = loaded(backend, Arc::new(MemorySettingsStore::new())).await;

        let pending = console.run_fitness_summary().unwrap();
        console.apply(pending.await);

        assert_eq!(console.toast(), Some("connection refused"));
        assert!(console.messages().is_empty());
    }

    #[tokio::test]
    async fn test_new_error_replaces_toast() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let mut console = loaded(backend, Arc::new(MemorySettingsStore::new())).await;

        console.apply(Outcome::FitnessSummary(Err(ApiError::Transport("first".into()))));
        console.apply(Outcome::Mcp(Err(ApiError::Transport("second".into()))));
        assert_eq!(console.toast(), Some("second"));
    }

    #[tokio::test]
    async fn test_empty_reply_text_placeholder() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let mut console = loaded(backend, Arc::new(MemorySettingsStore::new())).await;

        console.apply(Outcome::Chat(Ok(ChatResponse {
            model: String::new(),
            text: String::new(),
            used_context: false,
        })));
        assert_eq!(console.messages()[0], ChatEntry::assistant("(no text)", None));
    }

    #[tokio::test]
    async fn test_context_summary_and_initial_fetches() {
        let backend = Arc::new(FakeBackend::with_models(&["gemini-pro"]));
        let console = Console::new(
            Arc::clone(&backend) as Arc<dyn Backend>,
            Arc::new(MemorySettingsStore::new()),
            true,
        );
        assert_eq!(console.context_summary(), "No context loaded");

        console.start();
        console.queries().context.ensure().await.unwrap();
        console.queries().tools.ensure().await.unwrap();
        console.queries().models.ensure().await.unwrap();

        assert_eq!(console.context_summary(), "Strava synced");
        assert_eq!(console.tools()[0].name, "fitness_summary");
        assert_eq!(backend.model_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.tool_calls.load(Ordering::SeqCst), 1);
    }
}
