//! End-to-end turns against a scripted model and a temporary SQLite file

use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use fluxion_chat::{
    Agent, ProgressEmitter, ProgressEvent, ProgressStage, TextToSql, CHAT_TEMPERATURE,
    FALLBACK_OPERATION,
};
use fluxion_llm::{ChatMessage, ChatRole, ScriptedProvider};
use fluxion_sql::{Database, QuerySandbox, ReadOnlyDatabase, SandboxLimits};
use fluxion_tools::{register_article_tools, OperationCatalog};

struct Fixture {
    _dir: TempDir,
    db_path: PathBuf,
    schema_path: PathBuf,
    catalog: Arc<OperationCatalog>,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("news.db");
    let conn = Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE ArticleApproveds (
            id INTEGER PRIMARY KEY,
            userId INTEGER,
            articleId INTEGER,
            isApproved INTEGER,
            headlineForPdfReport TEXT,
            publicationNameForPdfReport TEXT,
            publicationDateForPdfReport TEXT,
            textForPdfReport TEXT,
            urlForPdfReport TEXT,
            kmNotes TEXT,
            createdAt TEXT,
            updatedAt TEXT
        );
        INSERT INTO ArticleApproveds VALUES
            (1, 7, 100, 1, 'Bridge safety review', 'Daily Post', '2024-01-10', 'Inspectors found cracks', 'http://a', NULL, '2024-01-11', '2024-01-11'),
            (2, 7, 101, 1, 'Harbor expansion', 'Coast Times', '2024-03-02', 'Port grows', 'http://b', 'safety angle', '2024-03-03', '2024-03-03'),
            (3, 8, 102, 0, 'Rejected piece', 'Daily Post', '2024-05-20', 'Off topic', 'http://c', NULL, '2024-05-21', '2024-05-21'),
            (4, 8, 103, 1, 'Budget vote', 'City Wire', '2024-07-15', 'Council approves', 'http://d', NULL, '2024-07-16', '2024-07-16');",
    )
    .unwrap();
    drop(conn);

    let schema_path = dir.path().join("SQL_SCHEMA.md");
    std::fs::write(
        &schema_path,
        "## ArticleApproveds\n- id INTEGER\n- isApproved INTEGER\n- headlineForPdfReport TEXT\n",
    )
    .unwrap();

    let catalog = Arc::new(OperationCatalog::new());
    register_article_tools(&catalog, Arc::new(Database::new(&db_path))).await;

    Fixture {
        _dir: dir,
        db_path,
        schema_path,
        catalog,
    }
}

impl Fixture {
    fn text_to_sql(&self, provider: Arc<ScriptedProvider>, limits: SandboxLimits) -> TextToSql {
        let sandbox = QuerySandbox::new(Arc::new(ReadOnlyDatabase::new(&self.db_path)), limits);
        TextToSql::new(provider, Arc::new(sandbox), &self.schema_path)
    }

    async fn agent(&self, provider: Arc<ScriptedProvider>) -> Agent {
        let t2s = self.text_to_sql(provider.clone(), SandboxLimits::default());
        Agent::new(provider, Arc::clone(&self.catalog), Some(t2s)).await
    }
}

fn recorder() -> (ProgressEmitter, Arc<Mutex<Vec<ProgressStage>>>) {
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let emitter = ProgressEmitter::new(move |event: ProgressEvent| {
        sink.lock().unwrap().push(event.stage);
    });
    (emitter, stages)
}

fn last_message(provider: &ScriptedProvider) -> ChatMessage {
    provider.calls().last().unwrap().messages.last().unwrap().clone()
}

#[tokio::test]
async fn test_plain_reply_is_returned_verbatim() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies(["Hello! How can I help?"]));
    let mut agent = fx.agent(provider.clone()).await;

    let answer = agent.process_message("hi").await.unwrap();

    assert_eq!(answer, "Hello! How can I help?");
    assert_eq!(provider.call_count(), 1);
    assert_eq!(
        agent.history(),
        &[ChatMessage::user("hi"), ChatMessage::assistant("Hello! How can I help?")]
    );

    let call = &provider.calls()[0];
    assert_eq!(call.temperature, CHAT_TEMPERATURE);
    assert_eq!(call.messages[0].role, ChatRole::System);
    assert_eq!(call.messages[0].content, agent.system_prompt());
}

#[tokio::test]
async fn test_invocation_happy_path() {
    let fx = fixture().await;
    let first = "TOOL_CALL: count_approved_articles\nARGUMENTS:\n{\n  \"is_approved\": true\n}\nEND_TOOL_CALL";
    let provider = Arc::new(ScriptedProvider::with_replies([
        first,
        "There are 3 approved articles.",
    ]));
    let (emitter, stages) = recorder();
    let mut agent = fx.agent(provider.clone()).await.with_progress(emitter);

    let answer = agent
        .process_message("How many articles are approved?")
        .await
        .unwrap();

    assert_eq!(answer, "There are 3 approved articles.");
    assert_eq!(provider.call_count(), 2);
    assert_eq!(agent.history().len(), 2);
    assert_eq!(agent.history()[1], ChatMessage::assistant("There are 3 approved articles."));

    let second = &provider.calls()[1].messages;
    assert_eq!(second.len(), 4);
    assert_eq!(second[2], ChatMessage::assistant(first));
    assert_eq!(
        second[3],
        ChatMessage::user("Tool 'count_approved_articles' executed successfully.\n\nResult:\n3")
    );

    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            ProgressStage::AnalysisStart,
            ProgressStage::ToolExecuting,
            ProgressStage::ToolSuccess,
            ProgressStage::GenerationStart,
        ]
    );
}

#[tokio::test]
async fn test_article_results_use_article_formatting() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies([
        r#"TOOL_CALL: search_approved_articles ARGUMENTS: {"search_text": "safety", "unknown": 1} END_TOOL_CALL"#,
        "Two articles mention safety.",
    ]));
    let mut agent = fx.agent(provider.clone()).await;

    agent.process_message("Anything on safety?").await.unwrap();

    let folded = last_message(&provider).content;
    assert!(folded.starts_with(
        "Tool 'search_approved_articles' executed successfully.\n\nResult:\nFound 2 article(s)."
    ));
    assert!(folded.contains("**Bridge safety review**"));
}

#[tokio::test]
async fn test_unknown_operation_is_folded_back() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies([
        "TOOL_CALL: delete_everything\nARGUMENTS:\n{}\nEND_TOOL_CALL",
        "I could not do that.",
    ]));
    let (emitter, stages) = recorder();
    let mut agent = fx.agent(provider.clone()).await.with_progress(emitter);

    let answer = agent.process_message("wipe it").await.unwrap();

    assert_eq!(answer, "I could not do that.");
    assert_eq!(
        last_message(&provider),
        ChatMessage::user("Tool 'delete_everything' failed: Tool 'delete_everything' not found")
    );
    assert!(stages.lock().unwrap().contains(&ProgressStage::ToolError));
}

#[tokio::test]
async fn test_missing_required_argument_is_folded_back() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies([
        "TOOL_CALL: get_article_by_id\nARGUMENTS:\n{}\nEND_TOOL_CALL",
        "Which article?",
    ]));
    let mut agent = fx.agent(provider.clone()).await;

    agent.process_message("show me the article").await.unwrap();

    assert_eq!(
        last_message(&provider).content,
        "Tool 'get_article_by_id' failed: Missing required parameter 'article_approved_id' for tool 'get_article_by_id'"
    );
}

#[tokio::test]
async fn test_malformed_arguments_mean_no_invocation() {
    let fx = fixture().await;
    let reply = "TOOL_CALL: count_approved_articles\nARGUMENTS:\n{is_approved: yes}\nEND_TOOL_CALL";
    let provider = Arc::new(ScriptedProvider::with_replies([reply]));
    let mut agent = fx.agent(provider.clone()).await;

    let answer = agent.process_message("count").await.unwrap();

    assert_eq!(answer, reply);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(agent.history().len(), 2);
}

#[tokio::test]
async fn test_history_carries_into_next_turn() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies(["First.", "Second."]));
    let mut agent = fx.agent(provider.clone()).await;

    agent.process_message("one").await.unwrap();
    agent.process_message("two").await.unwrap();

    let msgs = &provider.calls()[1].messages;
    assert_eq!(msgs.len(), 4);
    assert_eq!(msgs[1], ChatMessage::user("one"));
    assert_eq!(msgs[2], ChatMessage::assistant("First."));
    assert_eq!(msgs[3], ChatMessage::user("two"));

    agent.clear_history();
    assert!(agent.history().is_empty());
}

#[tokio::test]
async fn test_backend_error_ends_turn() {
    let fx = fixture().await;
    let provider = ScriptedProvider::new();
    provider.push_error("connection refused");
    let provider = Arc::new(provider);
    let mut agent = fx.agent(provider.clone()).await;

    let err = agent.process_message("hi").await.unwrap_err();
    assert!(format!("{:#}", err).contains("connection refused"));
}

#[tokio::test]
async fn test_fallback_rejects_generated_write() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies([
        r#"TOOL_CALL: execute_custom_sql ARGUMENTS: {"question": "drop the table"} END_TOOL_CALL"#,
        "```sql\nSELECT * FROM ArticleApproveds; DROP TABLE ArticleApproveds;\n```",
        "That request is not allowed.",
    ]));
    let (emitter, stages) = recorder();
    let mut agent = fx.agent(provider.clone()).await.with_progress(emitter);

    let answer = agent.process_message("drop the table").await.unwrap();

    assert_eq!(answer, "That request is not allowed.");
    assert_eq!(provider.call_count(), 3);
    let folded = last_message(&provider).content;
    assert!(folded.starts_with("Tool 'execute_custom_sql' failed: Query failed: "));
    assert!(folded.contains("DROP"));

    let conn = Connection::open(&fx.db_path).unwrap();
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM ArticleApproveds", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 4);

    let stages = stages.lock().unwrap();
    assert!(stages.contains(&ProgressStage::SqlGenerationStart));
    assert!(stages.contains(&ProgressStage::SqlExecuted));
    assert!(stages.contains(&ProgressStage::ToolError));
}

#[tokio::test]
async fn test_fallback_truncates_to_cap() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies([
        r#"TOOL_CALL: execute_custom_sql ARGUMENTS: {"question": "list ids"} END_TOOL_CALL"#,
        "SELECT id FROM ArticleApproveds ORDER BY id",
        "Here are the first ids.",
    ]));
    let limits = SandboxLimits {
        max_result_rows: 2,
        ..SandboxLimits::default()
    };
    let t2s = fx.text_to_sql(provider.clone(), limits);
    let mut agent = Agent::new(provider.clone(), Arc::clone(&fx.catalog), Some(t2s)).await;

    agent.process_message("list ids").await.unwrap();

    let folded = last_message(&provider).content;
    assert!(folded.starts_with("Tool 'execute_custom_sql' executed successfully."));
    assert!(folded.contains("Found 2 result(s)."));
    assert!(folded.contains("Results truncated to 2 rows"));
    assert!(!folded.contains("--- Row 3 ---"));

    let sql_call = &provider.calls()[1];
    assert_eq!(sql_call.max_tokens, Some(500));
    assert!(sql_call.messages[0].content.contains("USER QUESTION: list ids"));
}

#[tokio::test]
async fn test_fallback_unavailable_without_text_to_sql() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies([
        r#"TOOL_CALL: execute_custom_sql ARGUMENTS: {"question": "x"} END_TOOL_CALL"#,
        "Sorry.",
    ]));
    let mut agent = Agent::new(provider.clone(), Arc::clone(&fx.catalog), None).await;

    agent.process_message("x").await.unwrap();

    assert_eq!(provider.call_count(), 2);
    assert_eq!(
        last_message(&provider).content,
        "Tool 'execute_custom_sql' failed: Tool 'execute_custom_sql' not found"
    );
    assert!(!agent.system_prompt().contains(FALLBACK_OPERATION));
}

#[tokio::test]
async fn test_system_prompt_and_available_tools() {
    let fx = fixture().await;
    let agent = fx.agent(Arc::new(ScriptedProvider::new())).await;

    let tools = agent.available_tools().await;
    assert_eq!(tools.len(), 7);
    assert_eq!(tools[0], "count_approved_articles");
    assert_eq!(tools.last().map(String::as_str), Some(FALLBACK_OPERATION));

    let prompt = agent.system_prompt();
    assert!(prompt.contains("Tool: count_approved_articles"));
    assert!(prompt.contains("Tool: execute_custom_sql\nCategory: database"));

    let custom = agent.with_system_prompt("Answer in French.");
    assert_eq!(custom.system_prompt(), "Answer in French.");
}

#[tokio::test]
async fn test_direct_query_answers_from_results() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies([
        "```sql\nSELECT COUNT(*) AS n FROM ArticleApproveds WHERE isApproved = 1\n```",
        "Three articles are approved.",
    ]));
    let mut agent = fx.agent(provider.clone()).await;

    let answer = agent.process_direct_query("How many approved?").await;

    assert_eq!(answer, "Three articles are approved.");
    assert_eq!(provider.call_count(), 2);
    let folded = last_message(&provider).content;
    assert!(folded.contains("Result: 3"));
    assert_eq!(agent.history().len(), 2);
}

#[tokio::test]
async fn test_direct_query_errors_become_answer() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::new());
    let mut agent = Agent::new(provider, Arc::clone(&fx.catalog), None).await;

    let answer = agent.process_direct_query("How many?").await;

    assert_eq!(answer, "Error processing query: Text-to-SQL is not configured");
    assert_eq!(
        agent.history(),
        &[
            ChatMessage::user("How many?"),
            ChatMessage::assistant("Error processing query: Text-to-SQL is not configured"),
        ]
    );
}

#[tokio::test]
async fn test_direct_query_backend_error_is_caught() {
    let fx = fixture().await;
    let provider = ScriptedProvider::with_replies(["SELECT 1"]);
    provider.push_error("timeout");
    let provider = Arc::new(provider);
    let mut agent = fx.agent(provider).await;

    let answer = agent.process_direct_query("ping").await;
    assert!(answer.starts_with("Error processing query: "));
    assert!(answer.contains("timeout"));
}

#[tokio::test]
async fn test_streaming_commits_concatenation() {
    let fx = fixture().await;
    let provider = Arc::new(
        ScriptedProvider::with_replies(["Streaming answers arrive in pieces."]).with_chunk_size(5),
    );
    let mut agent = fx.agent(provider.clone()).await;

    let mut stream = agent.stream_response("tell me something").await.unwrap();
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next_chunk().await {
        chunks.push(chunk.unwrap());
    }

    assert!(chunks.len() > 1);
    assert_eq!(chunks.concat(), "Streaming answers arrive in pieces.");
    assert_eq!(
        agent.history(),
        &[
            ChatMessage::user("tell me something"),
            ChatMessage::assistant("Streaming answers arrive in pieces."),
        ]
    );

    let call = &provider.calls()[0];
    assert!(call.streamed);
    assert_eq!(call.temperature, CHAT_TEMPERATURE);
    assert_eq!(call.system_prompt.as_deref(), Some(agent.system_prompt()));
    assert_eq!(call.messages, vec![ChatMessage::user("tell me something")]);
}

#[tokio::test]
async fn test_streaming_skips_invocation_detection() {
    let fx = fixture().await;
    let reply = "TOOL_CALL: count_approved_articles\nARGUMENTS:\n{}\nEND_TOOL_CALL";
    let provider = Arc::new(ScriptedProvider::with_replies([reply]));
    let mut agent = fx.agent(provider.clone()).await;

    let text = agent
        .stream_response("count")
        .await
        .unwrap()
        .collect_text()
        .await
        .unwrap();

    assert_eq!(text, reply);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(agent.history()[1], ChatMessage::assistant(reply));
}

#[tokio::test]
async fn test_progress_details_for_sql() {
    let fx = fixture().await;
    let provider = Arc::new(ScriptedProvider::with_replies([
        "```sql\nSELECT id FROM ArticleApproveds WHERE id = 2\n```",
        "Article 2.",
    ]));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let mut agent = fx
        .agent(provider)
        .await
        .with_progress(ProgressEmitter::new(move |e| sink.lock().unwrap().push(e)));

    agent.process_direct_query("article two").await;

    let events = events.lock().unwrap();
    let executed = events
        .iter()
        .find(|e| e.stage == ProgressStage::SqlExecuted)
        .unwrap();
    let details = executed.details.clone().unwrap();
    assert_eq!(details["success"], json!(true));
    assert_eq!(details["row_count"], json!(1));
}
