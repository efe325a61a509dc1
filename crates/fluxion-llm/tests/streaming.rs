//! Streaming over a real HTTP connection with chunked transfer encoding

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use fluxion_llm::{GenerationOptions, LlmProvider, OllamaProvider, OpenAiProvider};

/// Read one request (headers plus `Content-Length` body) off the socket.
async fn read_request(socket: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        data.extend_from_slice(&buf[..n]);
        let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&data[..end]).to_lowercase();
        let length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if data.len() >= end + 4 + length {
            return;
        }
    }
}

/// Serve one response whose body is written as the given HTTP chunks.
async fn serve_chunks(content_type: &'static str, chunks: Vec<Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\n\r\n",
            content_type
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        for chunk in chunks {
            socket
                .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                .await
                .unwrap();
            socket.write_all(&chunk).await.unwrap();
            socket.write_all(b"\r\n").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
        socket.flush().await.unwrap();
    });

    format!("http://{}", addr)
}

/// Split `body` right after the lead byte of the first `é`.
fn split_inside_e_acute(body: &str) -> Vec<Vec<u8>> {
    let bytes = body.as_bytes();
    let cut = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
    vec![bytes[..cut].to_vec(), bytes[cut..].to_vec()]
}

async fn drain(provider: &dyn LlmProvider) -> String {
    let mut rx = provider
        .stream_generate("hi", &GenerationOptions::default())
        .await
        .unwrap();
    let mut text = String::new();
    while let Some(chunk) = rx.recv().await {
        text.push_str(&chunk.unwrap());
    }
    text
}

#[tokio::test]
async fn test_ollama_stream_keeps_split_character() {
    let body = "{\"response\":\"caf\",\"done\":false}\n{\"response\":\"é au lait\",\"done\":true}\n";
    let base_url = serve_chunks("application/x-ndjson", split_inside_e_acute(body)).await;

    let provider = OllamaProvider::new(None, Some(base_url), "llama3.1").unwrap();

    assert_eq!(drain(&provider).await, "café au lait");
}

#[tokio::test]
async fn test_openai_stream_keeps_split_character() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Crème\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" brûlée\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let base_url = serve_chunks("text/event-stream", split_inside_e_acute(body)).await;

    let provider =
        OpenAiProvider::new(Some("sk-test".to_string()), Some(base_url), "gpt-4o-mini").unwrap();

    assert_eq!(drain(&provider).await, "Crème brûlée");
}
