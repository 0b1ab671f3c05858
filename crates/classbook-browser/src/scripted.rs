//! Scripted in-memory page driver for tests.
//!
//! A [`Script`] describes what the fake site shows; the driver records every
//! call so tests can assert what was (and was not) touched.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use classbook_core::Credentials;

use crate::driver::{ActionRef, DriverError, DriverResult, PageDriver, SessionFactory, SlotAction, TextScope};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Navigate(String),
    CurrentUrl,
    SignIn(String),
    FindSlot(String),
    InvokeAction(String),
    InvokeSubmit,
    ReadText(TextScope),
    Snapshot(String),
    NextDialog,
    ResolveDialog(bool),
    Close,
}

/// What the fake reservation site does.
#[derive(Debug, Clone)]
pub struct Script {
    pub login_ok: bool,
    pub landing_url: String,
    /// Action cell text of the slot row; `None` = no row.
    pub slot_text: Option<String>,
    pub dialogs_after_action: Vec<String>,
    pub dialogs_after_submit: Vec<String>,
    pub has_submit: bool,
    pub texts: HashMap<TextScope, String>,
    pub snapshots_fail: bool,
}

impl Script {
    pub fn slot(text: &str) -> Self {
        Self {
            login_ok: true,
            landing_url: "https://gym.example/reserve".into(),
            slot_text: Some(text.to_string()),
            dialogs_after_action: Vec::new(),
            dialogs_after_submit: Vec::new(),
            has_submit: true,
            texts: HashMap::new(),
            snapshots_fail: false,
        }
    }

    pub fn no_slot() -> Self {
        Self {
            slot_text: None,
            ..Self::slot("")
        }
    }

    pub fn after_action(mut self, dialogs: &[&str]) -> Self {
        self.dialogs_after_action = dialogs.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn after_submit(mut self, dialogs: &[&str]) -> Self {
        self.dialogs_after_submit = dialogs.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_text(mut self, scope: TextScope, text: &str) -> Self {
        self.texts.insert(scope, text.to_string());
        self
    }

    pub fn without_submit(mut self) -> Self {
        self.has_submit = false;
        self
    }

    pub fn failing_login(mut self) -> Self {
        self.login_ok = false;
        self
    }

    pub fn landing_on(mut self, url: &str) -> Self {
        self.landing_url = url.to_string();
        self
    }

    pub fn failing_snapshots(mut self) -> Self {
        self.snapshots_fail = true;
        self
    }
}

/// In-memory [`PageDriver`] following a [`Script`].
pub struct ScriptedDriver {
    script: Script,
    url: String,
    dialogs: VecDeque<String>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedDriver {
    pub fn new(script: Script) -> Self {
        Self::with_log(script, Arc::new(Mutex::new(Vec::new())))
    }

    fn with_log(script: Script, calls: Arc<Mutex<Vec<Call>>>) -> Self {
        Self {
            script,
            url: "about:blank".into(),
            dialogs: VecDeque::new(),
            calls,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.record(Call::Navigate(url.to_string()));
        self.url = if url.contains("reserve") {
            self.script.landing_url.clone()
        } else {
            url.to_string()
        };
        Ok(())
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        self.record(Call::CurrentUrl);
        Ok(self.url.clone())
    }

    async fn sign_in(&mut self, credentials: &Credentials) -> DriverResult<()> {
        self.record(Call::SignIn(credentials.username.clone()));
        if self.script.login_ok {
            Ok(())
        } else {
            Err(DriverError::NoSuchElement("input[name='id']".into()))
        }
    }

    async fn find_slot_action(&mut self, time_label: &str) -> DriverResult<Option<SlotAction>> {
        self.record(Call::FindSlot(time_label.to_string()));
        Ok(self.script.slot_text.as_ref().map(|text| SlotAction {
            handle: ActionRef(format!("cell-{time_label}")),
            text: text.clone(),
        }))
    }

    async fn invoke_action(&mut self, action: &ActionRef) -> DriverResult<()> {
        self.record(Call::InvokeAction(action.0.clone()));
        self.dialogs.extend(self.script.dialogs_after_action.iter().cloned());
        Ok(())
    }

    async fn invoke_submit(&mut self) -> DriverResult<bool> {
        self.record(Call::InvokeSubmit);
        if !self.script.has_submit {
            return Ok(false);
        }
        self.dialogs.extend(self.script.dialogs_after_submit.iter().cloned());
        Ok(true)
    }

    async fn read_text(&mut self, scope: TextScope) -> DriverResult<String> {
        self.record(Call::ReadText(scope));
        Ok(self.script.texts.get(&scope).cloned().unwrap_or_default())
    }

    async fn snapshot(&mut self, label: &str) -> DriverResult<()> {
        self.record(Call::Snapshot(label.to_string()));
        if self.script.snapshots_fail {
            Err(DriverError::Io(std::io::Error::other("disk full")))
        } else {
            Ok(())
        }
    }

    async fn next_dialog(&mut self, _wait: Duration) -> DriverResult<Option<String>> {
        self.record(Call::NextDialog);
        Ok(self.dialogs.front().cloned())
    }

    async fn resolve_dialog(&mut self, accept: bool) -> DriverResult<()> {
        self.record(Call::ResolveDialog(accept));
        self.dialogs.pop_front().map(|_| ()).ok_or(DriverError::NoSuchAlert)
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.record(Call::Close);
        Ok(())
    }
}

/// Hands out one scripted session per attempt, in order. The last script is
/// reused once the queue runs dry.
pub struct ScriptedFactory {
    scripts: Mutex<VecDeque<Script>>,
    last: Mutex<Option<Script>>,
    calls: Arc<Mutex<Vec<Call>>>,
    opened: AtomicUsize,
    fail_open: bool,
}

impl ScriptedFactory {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(None),
            calls: Arc::new(Mutex::new(Vec::new())),
            opened: AtomicUsize::new(0),
            fail_open: false,
        }
    }

    /// A factory whose sessions never start.
    pub fn unreachable() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Every call across every session, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(&self) -> DriverResult<Box<dyn PageDriver>> {
        if self.fail_open {
            return Err(DriverError::Session("browser did not start".into()));
        }
        let script = {
            let mut queue = self
                .scripts
                .lock()
                .map_err(|_| DriverError::Session("script queue poisoned".into()))?;
            let mut last = self
                .last
                .lock()
                .map_err(|_| DriverError::Session("script queue poisoned".into()))?;
            match queue.pop_front() {
                Some(script) => {
                    *last = Some(script.clone());
                    script
                }
                None => last
                    .clone()
                    .ok_or_else(|| DriverError::Session("no scripts left".into()))?,
            }
        };
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDriver::with_log(script, self.calls.clone())))
    }
}
