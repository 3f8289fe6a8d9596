use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Result};
use once_cell::sync::Lazy;
use pullstack::{ErrorDisposition, HookError, HookFuture, HookStage, ItemHooks, ItemStore};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

pub type Fruit = (i64, String);

pub const FRUITS: [&str; 6] = ["Apple", "Banana", "Cherry", "Date", "Elderberry", "Fig"];

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn fruit_basket() -> Vec<Fruit> {
    FRUITS
        .iter()
        .enumerate()
        .map(|(index, name)| (index as i64, name.to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Pulled(String),
    Handled(String),
    Failed(String),
    PushedBack(String),
    Acked(String),
    Error(HookStage, Option<String>),
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    handling_started: Notify,
}

impl Recorder {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Pulled(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn acked(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Acked(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(HookStage, Option<String>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Error(stage, key) => Some((stage, key)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.events()
            .iter()
            .filter(|event| *event == wanted)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Completes once some handler entered `handling`.
    pub async fn handling_started(&self) {
        self.handling_started.notified().await;
    }
}

/// Hooks serving a fixed basket of fruit, recording every observable event.
pub struct FruitHooks {
    seed: Vec<Fruit>,
    source: Mutex<VecDeque<Fruit>>,
    fail_once: Mutex<HashSet<String>>,
    fail_init: bool,
    handling_delay: Duration,
    disposition: ErrorDisposition,
    recorder: Arc<Recorder>,
}

impl FruitHooks {
    pub fn new() -> Self {
        Self {
            seed: Vec::new(),
            source: Mutex::new(VecDeque::new()),
            fail_once: Mutex::new(HashSet::new()),
            fail_init: false,
            handling_delay: Duration::ZERO,
            disposition: ErrorDisposition::Continue,
            recorder: Arc::new(Recorder::default()),
        }
    }

    /// Items pushed onto the store by `on_init`; the last one ends up on top.
    pub fn seeded(mut self, items: Vec<Fruit>) -> Self {
        self.seed = items;
        self
    }

    /// Items returned one per call by `pulling`.
    pub fn pulling_from(self, items: Vec<Fruit>) -> Self {
        *self.source.lock().unwrap() = items.into();
        self
    }

    pub fn failing_once(self, key: &str) -> Self {
        self.fail_once.lock().unwrap().insert(key.to_string());
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn handling_delay(mut self, delay: Duration) -> Self {
        self.handling_delay = delay;
        self
    }

    pub fn aborting(mut self) -> Self {
        self.disposition = ErrorDisposition::Abort;
        self
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        self.recorder.clone()
    }
}

impl ItemHooks for FruitHooks {
    type Item = Fruit;

    fn on_init(&self, store: &mut ItemStore<Fruit>) -> Result<()> {
        if self.fail_init {
            bail!("fruit basket is empty");
        }
        for item in &self.seed {
            store.push(item.clone());
        }
        Ok(())
    }

    fn pulling(&self) -> HookFuture<'_, Option<Fruit>> {
        let next = self.source.lock().unwrap().pop_front();
        Box::pin(async move {
            if next.is_none() {
                sleep(Duration::from_millis(1)).await;
            }
            Ok(next)
        })
    }

    fn handling<'a>(&'a self, item: &'a Fruit) -> HookFuture<'a, ()> {
        Box::pin(async move {
            let recorder = &self.recorder;
            let current = recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            recorder.max_in_flight.fetch_max(current, Ordering::SeqCst);
            recorder.handling_started.notify_one();

            if !self.handling_delay.is_zero() {
                sleep(self.handling_delay).await;
            }
            recorder.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_once.lock().unwrap().remove(&item.1) {
                recorder.record(Event::Failed(item.1.clone()));
                return Err(anyhow!("{} is bruised", item.1));
            }
            recorder.record(Event::Handled(item.1.clone()));
            Ok(())
        })
    }

    fn push_back(&self, store: &mut ItemStore<Fruit>, item: Fruit) -> Result<()> {
        self.recorder.record(Event::PushedBack(item.1.clone()));
        store.push(item);
        Ok(())
    }

    fn on_pulled(&self, item: &Fruit) {
        self.recorder.record(Event::Pulled(item.1.clone()));
    }

    fn on_ack(&self, item: Fruit) -> HookFuture<'_, ()> {
        Box::pin(async move {
            self.recorder.record(Event::Acked(item.1));
            Ok(())
        })
    }

    fn on_error(&self, error: &HookError) -> ErrorDisposition {
        self.recorder
            .record(Event::Error(error.stage(), error.key().map(str::to_string)));
        self.disposition
    }
}

pub async fn wait_for_acks(recorder: &Recorder, expected: usize, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        let acked = recorder.acked().len();
        if acked >= expected {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("only {acked} of {expected} items acknowledged within {timeout:?}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

pub fn position(events: &[Event], wanted: &Event, occurrence: usize) -> Option<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, event)| *event == wanted)
        .nth(occurrence)
        .map(|(idx, _)| idx)
}
