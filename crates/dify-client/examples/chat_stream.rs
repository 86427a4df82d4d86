use dify_client::observability::init_observability;
use dify_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DifyError> {
    init_observability();
    let client = DifyClient::from_env()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Stream a short greeting.".to_string());
    let mut stream = client
        .chat_messages_stream(ChatMessageRequest::new(query, "demo-user"), cancel)
        .await?;

    while let Some(message) = stream.next_message().await {
        if let Some(error) = message.error {
            eprintln!("\nstream error: {error}");
            break;
        }
        match message.data {
            Some(StreamEvent::Message(chunk)) => print!("{}", chunk.answer),
            Some(StreamEvent::MessageReplace(replacement)) => {
                print!("\n[replaced] {}", replacement.answer)
            }
            Some(StreamEvent::MessageEnd(end)) => {
                println!("\n(conversation {})", end.conversation_id);
            }
            Some(StreamEvent::Error(event)) => {
                eprintln!("\nservice error ({}): {}", event.code, event.message)
            }
            Some(_) => {}
            None => eprintln!("\n(skipping unrecognized event {})", message.event),
        }
    }
    Ok(())
}
