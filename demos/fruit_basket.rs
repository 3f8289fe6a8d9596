use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use pullstack::{
    EngineConfig, ErrorDisposition, HookError, HookFuture, ItemHooks, ItemStore, RoleLayout,
    Runner,
};
use tokio::time::sleep;

const DEFAULT_CAPACITY: usize = 3;
const DEFAULT_THROTTLE_MS: u64 = 500;
const DEFAULT_HANDLING_MS: u64 = 2_000;
const DEFAULT_LOG_DIRECTIVE: &str = "info";
const FRUITS: [&str; 9] = [
    "Apple",
    "Banana",
    "Cherry",
    "Date",
    "Elderberry",
    "Fig",
    "Grape",
    "Honeydew",
    "Orange",
];

type Fruit = (i64, String);

#[tokio::main]
async fn main() -> Result<()> {
    init_example_tracing();

    let args = ExampleArgs::from_env()?;
    tracing::info!(
        capacity = args.capacity,
        throttle_ms = args.throttle_ms,
        handling_ms = args.handling_ms,
        workers = args.roles.total(),
        "starting fruit basket; send SIGINT or SIGTERM to stop"
    );

    let config = EngineConfig::builder()
        .capacity(args.capacity)
        .throttle(Duration::from_millis(args.throttle_ms))
        .roles(args.roles)
        .build()?;
    let hooks = FruitBasket {
        handling_time: Duration::from_millis(args.handling_ms),
    };

    Runner::new(config, hooks).wait_termination().await;
    Ok(())
}

fn init_example_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    pullstack::init_tracing();
}

struct FruitBasket {
    handling_time: Duration,
}

impl ItemHooks for FruitBasket {
    type Item = Fruit;

    fn on_init(&self, store: &mut ItemStore<Fruit>) -> Result<()> {
        for (index, name) in FRUITS.iter().enumerate() {
            store.push((index as i64, name.to_string()));
        }
        tracing::info!(fruits = store.len(), "basket filled");
        Ok(())
    }

    fn pulling(&self) -> HookFuture<'_, Option<Fruit>> {
        Box::pin(async { Ok(None) })
    }

    fn handling<'a>(&'a self, item: &'a Fruit) -> HookFuture<'a, ()> {
        Box::pin(async move {
            tracing::info!(fruit = %item.1, "peeling");
            sleep(self.handling_time).await;
            Ok(())
        })
    }

    fn on_pulled(&self, item: &Fruit) {
        tracing::info!(fruit = %item.1, index = item.0, "taken from basket");
    }

    fn on_ack(&self, item: Fruit) -> HookFuture<'_, ()> {
        Box::pin(async move {
            tracing::info!(fruit = %item.1, "eaten");
            Ok(())
        })
    }

    fn on_error(&self, error: &HookError) -> ErrorDisposition {
        tracing::warn!(error = %error, "fruit basket hook failed");
        ErrorDisposition::Continue
    }
}

struct ExampleArgs {
    capacity: usize,
    throttle_ms: u64,
    handling_ms: u64,
    roles: RoleLayout,
}

impl ExampleArgs {
    fn from_env() -> Result<Self> {
        let capacity = parse_env_with_default::<usize>("PULLSTACK_CAPACITY", DEFAULT_CAPACITY)?;
        let throttle_ms =
            parse_env_with_default::<u64>("PULLSTACK_THROTTLE_MS", DEFAULT_THROTTLE_MS)?;
        let handling_ms =
            parse_env_with_default::<u64>("PULLSTACK_HANDLING_MS", DEFAULT_HANDLING_MS)?;
        let roles = match parse_env::<usize>("PULLSTACK_WORKERS")? {
            Some(workers) => {
                ensure!(workers > 0, "PULLSTACK_WORKERS must be greater than 0");
                RoleLayout::from_parallelism(workers)
            }
            None => RoleLayout::from_available_parallelism(),
        };

        Ok(Self {
            capacity,
            throttle_ms,
            handling_ms,
            roles,
        })
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_env(key)?.unwrap_or(default))
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
