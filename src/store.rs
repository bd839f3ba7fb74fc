//! Client-side list store.
//!
//! One explicit `Store` per app session (no global). Every mutation goes
//! through [`Store::dispatch`]; the dispatch-boundary operations call the
//! backend and turn failures into state instead of returning them.

use serde::Serialize;
use serde_json::Value;

use crate::api::{ApiError, BillingApi};
use crate::models::entity::{effective_timestamp, entity_id};
use crate::models::{BillRecord, NegotiationCase};
use crate::reconcile::{merge_as, merge_lists};
use crate::socket::DashboardPush;

const MAX_TOASTS: usize = 5;

/// A REST-backed list plus the pushes received since.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListSlice {
    pub base: Vec<Value>,
    pub overlay: Vec<Value>,
    pub loading: bool,
    pub error: Option<String>,
}

impl ListSlice {
    /// Reconciled view, newest first.
    pub fn items(&self) -> Vec<Value> {
        merge_lists(&self.base, &self.overlay)
    }

    fn load(&mut self, items: Vec<Value>) {
        self.base = items;
        self.loading = false;
        self.error = None;
        // Pushes the fresh fetch already reflects would only shadow it.
        let base = &self.base;
        self.overlay.retain(|pushed| {
            let Some(id) = entity_id(pushed) else {
                return true;
            };
            match base.iter().find(|b| entity_id(b).as_deref() == Some(id.as_str())) {
                Some(fetched) => effective_timestamp(pushed) > effective_timestamp(fetched),
                None => true,
            }
        });
    }

    /// Fold pushes into the overlay so repeated pushes for one id keep one row.
    fn push(&mut self, items: Vec<Value>) {
        let pending = std::mem::take(&mut self.overlay);
        self.overlay = merge_lists(&pending, &items);
    }

    fn remove(&mut self, id: &str) {
        let keep = |entity: &Value| entity_id(entity).as_deref() != Some(id);
        self.base.retain(keep);
        self.overlay.retain(keep);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub id: u64,
    pub level: ToastLevel,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreState {
    pub bills: ListSlice,
    pub negotiations: ListSlice,
    pub toasts: Vec<Toast>,
    next_toast_id: u64,
}

#[derive(Debug, Clone)]
pub enum Action {
    BillsRequested,
    BillsLoaded(Vec<Value>),
    BillsFailed(String),
    /// Socket push or single-bill response.
    BillsPushed(Vec<Value>),
    NegotiationsRequested,
    NegotiationsLoaded(Vec<Value>),
    NegotiationsFailed(String),
    NegotiationUpserted(Value),
    NegotiationRemoved(String),
    ToastPushed { level: ToastLevel, message: String },
    ToastDismissed(u64),
    Reset,
}

/// Reducer. Each action replaces or merges exactly one slice.
pub fn reduce(state: &mut StoreState, action: Action) {
    match action {
        Action::BillsRequested => {
            state.bills.loading = true;
            state.bills.error = None;
        }
        Action::BillsLoaded(items) => state.bills.load(items),
        Action::BillsFailed(message) => {
            state.bills.loading = false;
            state.bills.error = Some(message);
        }
        Action::BillsPushed(items) => state.bills.push(items),
        Action::NegotiationsRequested => {
            state.negotiations.loading = true;
            state.negotiations.error = None;
        }
        Action::NegotiationsLoaded(items) => state.negotiations.load(items),
        Action::NegotiationsFailed(message) => {
            state.negotiations.loading = false;
            state.negotiations.error = Some(message);
        }
        Action::NegotiationUpserted(case) => state.negotiations.push(vec![case]),
        Action::NegotiationRemoved(id) => state.negotiations.remove(&id),
        Action::ToastPushed { level, message } => {
            state.next_toast_id += 1;
            state.toasts.push(Toast {
                id: state.next_toast_id,
                level,
                message,
            });
            if state.toasts.len() > MAX_TOASTS {
                let excess = state.toasts.len() - MAX_TOASTS;
                state.toasts.drain(..excess);
            }
        }
        Action::ToastDismissed(id) => state.toasts.retain(|t| t.id != id),
        Action::Reset => *state = StoreState::default(),
    }
}

#[derive(Debug, Default)]
pub struct Store {
    state: StoreState,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn dispatch(&mut self, action: Action) {
        reduce(&mut self.state, action);
    }

    pub fn bills(&self) -> Vec<BillRecord> {
        merge_as(&self.state.bills.base, &self.state.bills.overlay)
    }

    pub fn negotiations(&self) -> Vec<NegotiationCase> {
        merge_as(&self.state.negotiations.base, &self.state.negotiations.overlay)
    }

    pub fn fetch_bills<A: BillingApi + ?Sized>(&mut self, api: &A, user_id: &str) {
        self.dispatch(Action::BillsRequested);
        match api.fetch_bills(user_id) {
            Ok(items) => {
                tracing::info!(count = items.len(), "Bills fetched");
                self.dispatch(Action::BillsLoaded(items));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch bills");
                self.dispatch(Action::BillsFailed(e.user_message()));
            }
        }
    }

    pub fn fetch_negotiations<A: BillingApi + ?Sized>(&mut self, api: &A, user_id: &str) {
        self.dispatch(Action::NegotiationsRequested);
        match api.fetch_negotiation_cases(user_id) {
            Ok(items) => {
                tracing::info!(count = items.len(), "Negotiation cases fetched");
                self.dispatch(Action::NegotiationsLoaded(items));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch negotiation cases");
                self.dispatch(Action::NegotiationsFailed(e.user_message()));
            }
        }
    }

    /// Delete a case, then refetch the list. Returns whether the delete
    /// went through.
    pub fn remove_negotiation<A: BillingApi + ?Sized>(&mut self, api: &A, user_id: &str, id: &str) -> bool {
        match api.delete_negotiation(id) {
            Ok(deleted) => {
                tracing::info!(case_id = %deleted, "Negotiation case deleted");
                self.dispatch(Action::NegotiationRemoved(deleted));
                self.toast(ToastLevel::Success, "Negotiation case deleted");
                self.fetch_negotiations(api, user_id);
                true
            }
            Err(e) => {
                tracing::warn!(case_id = %id, error = %e, "Failed to delete negotiation case");
                self.toast(ToastLevel::Error, &e.user_message());
                false
            }
        }
    }

    /// Explicit retry of a failed bill parse.
    pub fn retry_bill_parse<A: BillingApi + ?Sized>(&mut self, api: &A, bill_id: &str) -> bool {
        match api.retry_bill_parse(bill_id) {
            Ok(updated) => {
                tracing::info!(bill_id = %bill_id, "Bill parse retry requested");
                let pushed = if entity_id(&updated).is_some() {
                    updated
                } else {
                    serde_json::json!({ "id": bill_id, "status": "parsing" })
                };
                self.dispatch(Action::BillsPushed(vec![pushed]));
                self.toast(ToastLevel::Info, "We're taking another look at your bill");
                true
            }
            Err(e) => {
                tracing::warn!(bill_id = %bill_id, error = %e, "Bill parse retry failed");
                self.toast(ToastLevel::Error, &retry_message(&e));
                false
            }
        }
    }

    /// Socket `dashboard-event`.
    pub fn dashboard_event(&mut self, push: DashboardPush) {
        tracing::debug!(count = push.bills.len(), "Dashboard push received");
        if !push.bills.is_empty() {
            self.dispatch(Action::BillsPushed(push.bills));
        }
        if let Some(step) = push.step {
            self.toast(ToastLevel::Info, &step);
        }
    }

    /// Record a case returned by a create or update.
    pub fn upsert_negotiation(&mut self, case: Value) {
        self.dispatch(Action::NegotiationUpserted(case));
    }

    pub fn dismiss_toast(&mut self, id: u64) {
        self.dispatch(Action::ToastDismissed(id));
    }

    fn toast(&mut self, level: ToastLevel, message: &str) {
        self.dispatch(Action::ToastPushed {
            level,
            message: message.to_string(),
        });
    }
}

fn retry_message(error: &ApiError) -> String {
    match error {
        ApiError::Status { status: 404, .. } => "That bill no longer exists".to_string(),
        other => other.user_message(),
    }
}
