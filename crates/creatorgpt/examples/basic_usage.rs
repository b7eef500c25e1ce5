//! Basic usage example for CreatorGpt.
//!
//! This example walks through the core API against the in-memory store:
//! - Signing up through a session
//! - Liking and unliking a team member
//! - Publishing and reading the notice banner
//! - Sending a contact message
//! - Solving a question (only when `GEMINI_API_KEY` is set)
//!
//! Run with: cargo run --example basic_usage

use std::sync::Arc;

use creatorgpt::{
    Config, ContactForm, DocumentStore, GeminiClient, LikeCounter, LocalIdentityProvider,
    MemoryStore, NoticeBoard, Session, Solver,
};

#[tokio::main]
async fn main() -> creatorgpt::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== CreatorGpt Basic Usage Example ===\n");

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

    // -------------------------------------------------------------------------
    // Step 1: Sign up
    // -------------------------------------------------------------------------
    println!("1. Signing up...");
    let session = Session::start(Arc::new(LocalIdentityProvider::new(store.clone())));
    let user = session.sign_up("ada@example.com", "hunter22").await?;
    println!("   Signed in as {} ({})\n", user.email, user.uid);

    // -------------------------------------------------------------------------
    // Step 2: Like a team member
    // -------------------------------------------------------------------------
    println!("2. Liking shyamchand...");
    let mut likes = LikeCounter::new(store.clone(), "shyamchand");
    likes.initialize(session.user_id().as_deref()).await;

    let outcome = likes.toggle(session.user_id().as_deref()).await;
    println!("   {outcome:?}: {} likes, liked = {}", likes.count(), likes.is_liked());

    let outcome = likes.toggle(session.user_id().as_deref()).await;
    println!("   {outcome:?}: {} likes, liked = {}\n", likes.count(), likes.is_liked());

    // -------------------------------------------------------------------------
    // Step 3: Notice banner
    // -------------------------------------------------------------------------
    println!("3. Notice banner...");
    let board = NoticeBoard::open(&store).await?;
    NoticeBoard::publish(&store, "New subjects coming soon!").await?;
    println!("   Notice: {}\n", board.text().unwrap_or_default());

    // -------------------------------------------------------------------------
    // Step 4: Contact form
    // -------------------------------------------------------------------------
    println!("4. Sending a contact message...");
    let mut form = ContactForm::new("Ada", "ada@example.com", "Love the Bengali answers!");
    let status = form.submit(&store).await;
    println!("   {}\n", status.banner().unwrap_or("Fill in every field."));

    // -------------------------------------------------------------------------
    // Step 5: Solve a question
    // -------------------------------------------------------------------------
    println!("5. Solving a question...");
    match std::env::var("GEMINI_API_KEY") {
        Ok(key) => {
            let client = GeminiClient::new(&Config::new().with_gemini_api_key(key))?;
            let mut solver = Solver::new(Arc::new(client));
            solver.select_subject("math")?;
            solver.set_question("Solve 2x + 3 = 11");
            println!("   {}", solver.solve().await.unwrap_or_default());
        }
        Err(_) => println!("   GEMINI_API_KEY not set, skipping"),
    }

    likes.teardown();
    session.sign_out().await;
    session.end();

    println!("\n=== Example Complete ===");
    Ok(())
}
