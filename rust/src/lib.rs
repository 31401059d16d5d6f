mod actions;
mod core;
mod logging;
mod record;
mod state;
mod transport;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::{AppAction, OutgoingPayload};
pub use record::*;
pub use state::*;
pub use transport::{
    classify_status, ChatTransport, ErrorClass, HttpTransport, LoopbackTransport, TransportError,
    UnavailableTransport,
};
pub use updates::*;

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

#[uniffi::export]
impl ChatApp {
    /// Transport and push channel are chosen from `<data_dir>/courier_config.json`.
    #[uniffi::constructor]
    pub fn new(data_dir: String, user_id: String) -> Arc<Self> {
        Self::start(data_dir, user_id, None)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}

impl ChatApp {
    /// Same as [`ChatApp::new`] but with a caller-provided backend.
    pub fn with_transport(
        data_dir: String,
        user_id: String,
        transport: Arc<dyn ChatTransport>,
    ) -> Arc<Self> {
        Self::start(data_dir, user_id, Some(transport))
    }

    fn start(
        data_dir: String,
        user_id: String,
        transport: Option<Arc<dyn ChatTransport>>,
    ) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "ChatApp starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty(user_id.clone())));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                &data_dir,
                user_id,
                shared_for_core,
                transport,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    /// Feed a record through the real-time path without a socket.
    pub fn inject_push_record_for_tests(&self, record: MessageRecord) {
        let _ = self
            .core_tx
            .send(CoreMsg::Internal(Box::new(InternalEvent::PushReceived(
                record,
            ))));
    }
}
