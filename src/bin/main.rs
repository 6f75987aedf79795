use std::io::{self, Write};
use std::sync::Arc;
use stock_info_agent::{
    capabilities::build_registry, dispatch::DispatchLoop, market::YahooClient,
    openai::OpenAiClient, operator::ConsoleOperator,
};
use tracing::info;

const EXIT_KEYWORDS: [&str; 3] = ["quit", "exit", "bye"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Stock Info Agent starting");

    // Missing credential is fatal at startup, not a per-call error.
    let model = Arc::new(OpenAiClient::from_env()?);
    let market = Arc::new(YahooClient::new());
    let operator = Arc::new(ConsoleOperator::new());
    let registry = build_registry(market, operator);

    let mut agent = DispatchLoop::new(model, registry);

    println!("Stock Info Agent");
    println!("Ask me about stock prices, company CEOs, or other stock-related questions!");
    println!("Type 'quit' to exit.\n");

    let stdin = io::stdin();
    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            // EOF ends the session like an exit keyword would.
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if EXIT_KEYWORDS.contains(&input.to_lowercase().as_str()) {
            println!("Goodbye!");
            break;
        }

        match agent.process_query(input).await {
            Ok(answer) => println!("\nAgent: {}\n", answer),
            Err(e) => eprintln!("\nError: {}\n", e),
        }
    }

    Ok(())
}
