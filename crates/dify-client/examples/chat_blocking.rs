use dify_client::observability::init_observability;
use dify_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DifyError> {
    init_observability();
    let client = DifyClient::from_env()?;

    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Say hello in one sentence.".to_string());
    let response = client
        .chat_messages(ChatMessageRequest::new(query, "demo-user"))
        .await?;

    println!("{}", response.answer);
    println!("(conversation {})", response.conversation_id);
    Ok(())
}
