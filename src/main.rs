use krakenlink::LinkError;
use krakenlink::config::fetch_config;
use krakenlink::credentials::populate_env_from_keychain;
use krakenlink::models::{Channel, SubscribeOptions};
use krakenlink::websocket::{KrakenWsClient, MarketEvent};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const PAIRS: [&str; 2] = ["XBT/USD", "ETH/USD"];

fn main() -> Result<(), LinkError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Must run before the runtime starts worker threads.
    populate_env_from_keychain();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| LinkError::Config(format!("failed to start runtime: {e}")))?
        .block_on(run())
}

async fn run() -> Result<(), LinkError> {
    let app_config = fetch_config()?;
    let authenticated = app_config.kraken.has_credentials();

    let (client, mut events) = KrakenWsClient::connect(app_config.kraken).await?;

    client
        .subscribe(Channel::Ticker, &PAIRS, SubscribeOptions::default())
        .await?;
    client
        .subscribe(Channel::Book, &PAIRS, SubscribeOptions::depth(10))
        .await?;
    client
        .subscribe(Channel::Trade, &PAIRS, SubscribeOptions::default())
        .await?;

    if authenticated
        && let Err(e) = client
            .subscribe(Channel::OpenOrders, &[], SubscribeOptions::default())
            .await
    {
        warn!(error = %e, "Account channels unavailable");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(MarketEvent::Ticker { pair, ticker }) => {
                    info!(pair, bid = %ticker.bid.price(), ask = %ticker.ask.price(), "Ticker");
                }
                Some(MarketEvent::BookUpdate { pair, .. }) => {
                    if let Some(book) = client.order_book(&pair) {
                        info!(pair, mid = ?book.mid_price(), spread = ?book.spread(), "Book");
                    }
                }
                Some(MarketEvent::Trades { pair, trades }) => {
                    for trade in trades {
                        info!(pair, price = %trade.price, volume = %trade.volume, side = ?trade.side, "Trade");
                    }
                }
                Some(MarketEvent::BookInvalidated { pair, reason }) => {
                    warn!(pair, reason, "Book invalidated");
                }
                Some(MarketEvent::Disconnected { kind, reason }) => {
                    error!(%kind, reason, "Disconnected");
                    break;
                }
                Some(other) => info!(event = ?other, "Event"),
                None => break,
            },
        }
    }

    client.close().await;
    Ok(())
}
