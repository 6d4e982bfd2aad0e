//! Session actor
//!
//! One tokio task owns the `FormSession`. User commands and the completions
//! of scan/crop tasks arrive on the same mpsc channel and are applied one at
//! a time, so the session never has two writers.
//!
//! Scan and crop work runs in independent tasks holding only a weak sender:
//! when every handle is gone the actor stops and late completions are
//! dropped.

use crate::aggregator::ColumnSelectionRequest;
use crate::collaborators::{CropRenderer, CroppedImage, ImageData, LabelScanner, ScanError};
use crate::error::{EngineError, EngineResult};
use crate::field::{CropOutcome, Field};
use crate::fill::{ColumnChoice, CropKey};
use crate::images::ScanStatus;
use crate::options::FillOption;
use crate::prefill::PrefillRecord;
use crate::scan::ScanOutput;
use crate::session::FormSession;
use crate::snapshot::FormSnapshot;
use crate::types::{Attribute, FieldId, ImageId};
use crate::validation::ValidationReport;
use crate::value::FieldValue;
use foodform_common::events::{EventBus, SessionEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// External workers the actor dispatches to
#[derive(Clone)]
pub struct Collaborators {
    pub scanner: Arc<dyn LabelScanner>,
    pub cropper: Arc<dyn CropRenderer>,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    AddImage {
        data: ImageData,
        reply: Reply<ImageId>,
    },
    SelectColumn {
        image_id: ImageId,
        column: ColumnChoice,
        reply: Reply<EngineResult<()>>,
    },
    RemoveImage {
        image_id: ImageId,
        reply: Reply<EngineResult<()>>,
    },
    ApplyPrefill {
        record: PrefillRecord,
        reply: Reply<EngineResult<()>>,
    },
    OptionsFor {
        field_id: FieldId,
        reply: Reply<EngineResult<Vec<FillOption>>>,
    },
    AcceptOption {
        field_id: FieldId,
        option: FillOption,
        reply: Reply<EngineResult<()>>,
    },
    RegisterUserInput {
        field_id: FieldId,
        value: FieldValue,
        reply: Reply<EngineResult<()>>,
    },
    DiscardScan {
        field_id: FieldId,
        reply: Reply<EngineResult<bool>>,
    },
    DiscardAllScanned {
        reply: Reply<usize>,
    },
    RemoveBarcode {
        payload: String,
        reply: Reply<Vec<ImageId>>,
    },
    AddSize {
        reply: Reply<FieldId>,
    },
    AddBarcodeField {
        reply: Reply<FieldId>,
    },
    FieldFor {
        attribute: Attribute,
        reply: Reply<Option<Field>>,
    },
    ImageStatus {
        image_id: ImageId,
        reply: Reply<Option<ScanStatus>>,
    },
    PendingColumnSelection {
        image_id: ImageId,
        reply: Reply<Option<ColumnSelectionRequest>>,
    },
    Validate {
        reply: Reply<ValidationReport>,
    },
    Snapshot {
        reply: Reply<FormSnapshot>,
    },
    Close {
        reply: Reply<FormSnapshot>,
    },

    // Task completions
    ScanFinished {
        image_id: ImageId,
        result: Result<ScanOutput, ScanError>,
    },
    CropFinished {
        field_id: FieldId,
        key: CropKey,
        image: Option<CroppedImage>,
    },
}

/// Cloneable handle to a running session actor
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    event_bus: EventBus,
    session_id: Uuid,
}

impl SessionHandle {
    /// Start the actor task that owns `session`
    ///
    /// # Arguments
    /// * `session` - Session to own; its settings size the command queue
    /// * `collaborators` - Scanner and crop renderer for spawned tasks
    pub fn spawn(session: FormSession, collaborators: Collaborators) -> Self {
        let capacity = session.settings().command_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Command>(capacity);
        let handle = Self {
            event_bus: session.event_bus().clone(),
            session_id: session.id(),
            tx: tx.clone(),
        };

        let weak = tx.downgrade();
        drop(tx);
        tokio::spawn(async move {
            run_session(session, collaborators, rx, weak).await;
        });

        info!(session_id = %handle.session_id, capacity, "Session actor started");
        handle
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_bus.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> EngineResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        rx.await.map_err(|_| EngineError::SessionClosed)
    }

    /// Add an image and start scanning it
    pub async fn add_image(&self, data: ImageData) -> EngineResult<ImageId> {
        self.request(|reply| Command::AddImage { data, reply }).await
    }

    pub async fn select_column(&self, image_id: ImageId, column: ColumnChoice) -> EngineResult<()> {
        self.request(|reply| Command::SelectColumn {
            image_id,
            column,
            reply,
        })
        .await?
    }

    pub async fn remove_image(&self, image_id: ImageId) -> EngineResult<()> {
        self.request(|reply| Command::RemoveImage { image_id, reply })
            .await?
    }

    pub async fn apply_prefill(&self, record: PrefillRecord) -> EngineResult<()> {
        self.request(|reply| Command::ApplyPrefill { record, reply })
            .await?
    }

    pub async fn options_for(&self, field_id: FieldId) -> EngineResult<Vec<FillOption>> {
        self.request(|reply| Command::OptionsFor { field_id, reply })
            .await?
    }

    pub async fn accept_option(&self, field_id: FieldId, option: FillOption) -> EngineResult<()> {
        self.request(|reply| Command::AcceptOption {
            field_id,
            option,
            reply,
        })
        .await?
    }

    pub async fn register_user_input(&self, field_id: FieldId, value: FieldValue) -> EngineResult<()> {
        self.request(|reply| Command::RegisterUserInput {
            field_id,
            value,
            reply,
        })
        .await?
    }

    pub async fn discard_scan(&self, field_id: FieldId) -> EngineResult<bool> {
        self.request(|reply| Command::DiscardScan { field_id, reply })
            .await?
    }

    pub async fn discard_all_scanned(&self) -> EngineResult<usize> {
        self.request(|reply| Command::DiscardAllScanned { reply }).await
    }

    pub async fn remove_barcode(&self, payload: impl Into<String>) -> EngineResult<Vec<ImageId>> {
        let payload = payload.into();
        self.request(|reply| Command::RemoveBarcode { payload, reply })
            .await
    }

    pub async fn add_size(&self) -> EngineResult<FieldId> {
        self.request(|reply| Command::AddSize { reply }).await
    }

    pub async fn add_barcode_field(&self) -> EngineResult<FieldId> {
        self.request(|reply| Command::AddBarcodeField { reply }).await
    }

    /// Copy of the first field of `attribute`
    pub async fn field_for(&self, attribute: Attribute) -> EngineResult<Option<Field>> {
        self.request(|reply| Command::FieldFor { attribute, reply })
            .await
    }

    pub async fn image_status(&self, image_id: ImageId) -> EngineResult<Option<ScanStatus>> {
        self.request(|reply| Command::ImageStatus { image_id, reply })
            .await
    }

    pub async fn pending_column_selection(
        &self,
        image_id: ImageId,
    ) -> EngineResult<Option<ColumnSelectionRequest>> {
        self.request(|reply| Command::PendingColumnSelection { image_id, reply })
            .await
    }

    pub async fn validate(&self) -> EngineResult<ValidationReport> {
        self.request(|reply| Command::Validate { reply }).await
    }

    pub async fn snapshot(&self) -> EngineResult<FormSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop the actor; returns the final snapshot
    pub async fn close(self) -> EngineResult<FormSnapshot> {
        self.request(|reply| Command::Close { reply }).await
    }
}

/// Actor loop: apply commands in arrival order until closed
async fn run_session(
    mut session: FormSession,
    collaborators: Collaborators,
    mut rx: mpsc::Receiver<Command>,
    weak: mpsc::WeakSender<Command>,
) {
    let session_id = session.id();

    while let Some(command) = rx.recv().await {
        if let Command::Close { reply } = command {
            let _ = reply.send(session.snapshot());
            break;
        }

        handle_command(&mut session, &collaborators, &weak, command);
        spawn_crops(&mut session, &collaborators, &weak);
    }

    info!(session_id = %session_id, "Session actor stopped");
}

fn handle_command(
    session: &mut FormSession,
    collaborators: &Collaborators,
    weak: &mpsc::WeakSender<Command>,
    command: Command,
) {
    // A dropped reply receiver only means the caller stopped waiting
    match command {
        Command::AddImage { data, reply } => {
            let image_id = session.add_image(data.clone());
            if let Err(e) = session.mark_scan_started(image_id) {
                warn!(image_id = %image_id, error = %e, "Could not start scan");
            } else {
                spawn_scan(collaborators, weak, image_id, data);
            }
            let _ = reply.send(image_id);
        }
        Command::SelectColumn {
            image_id,
            column,
            reply,
        } => {
            let _ = reply.send(session.select_column(image_id, column));
        }
        Command::RemoveImage { image_id, reply } => {
            let _ = reply.send(session.remove_image(image_id));
        }
        Command::ApplyPrefill { record, reply } => {
            let _ = reply.send(session.apply_prefill(record));
        }
        Command::OptionsFor { field_id, reply } => {
            let _ = reply.send(session.options_for(field_id));
        }
        Command::AcceptOption {
            field_id,
            option,
            reply,
        } => {
            let _ = reply.send(session.accept_option(field_id, &option));
        }
        Command::RegisterUserInput {
            field_id,
            value,
            reply,
        } => {
            let _ = reply.send(session.register_user_input(field_id, value));
        }
        Command::DiscardScan { field_id, reply } => {
            let _ = reply.send(session.discard_scan(field_id));
        }
        Command::DiscardAllScanned { reply } => {
            let _ = reply.send(session.discard_all_scanned());
        }
        Command::RemoveBarcode { payload, reply } => {
            let _ = reply.send(session.remove_barcode(&payload));
        }
        Command::AddSize { reply } => {
            let _ = reply.send(session.add_size());
        }
        Command::AddBarcodeField { reply } => {
            let _ = reply.send(session.add_barcode_field());
        }
        Command::FieldFor { attribute, reply } => {
            let _ = reply.send(session.field_for(attribute).cloned());
        }
        Command::ImageStatus { image_id, reply } => {
            let _ = reply.send(session.images().get(image_id).map(|i| i.status));
        }
        Command::PendingColumnSelection { image_id, reply } => {
            let pending = session
                .images()
                .get(image_id)
                .and_then(|i| i.pending_column_selection.clone());
            let _ = reply.send(pending);
        }
        Command::Validate { reply } => {
            let _ = reply.send(session.validate());
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(session.snapshot());
        }
        Command::Close { reply } => {
            let _ = reply.send(session.snapshot());
        }
        Command::ScanFinished { image_id, result } => {
            if let Err(e) = session.apply_scan_result(image_id, result) {
                warn!(image_id = %image_id, error = %e, "Scan result not applied");
            }
        }
        Command::CropFinished {
            field_id,
            key,
            image,
        } => {
            let outcome = session.complete_crop(field_id, &key, image);
            if outcome == CropOutcome::Stale {
                debug!(field_id = %field_id, "Crop superseded before it finished");
            }
        }
    }
}

fn spawn_scan(
    collaborators: &Collaborators,
    weak: &mpsc::WeakSender<Command>,
    image_id: ImageId,
    data: ImageData,
) {
    let scanner = Arc::clone(&collaborators.scanner);
    let weak = weak.clone();

    tokio::spawn(async move {
        debug!(image_id = %image_id, scanner = scanner.name(), "Scanning image");
        let result = scanner.scan(data).await;

        let Some(tx) = weak.upgrade() else {
            debug!(image_id = %image_id, "Session gone, dropping scan result");
            return;
        };
        let _ = tx.send(Command::ScanFinished { image_id, result }).await;
    });
}

/// Start a render task for every crop the last command requested
fn spawn_crops(
    session: &mut FormSession,
    collaborators: &Collaborators,
    weak: &mpsc::WeakSender<Command>,
) {
    for request in session.take_crop_requests() {
        let Some((data, regions)) = session.crop_input(&request) else {
            session.complete_crop(request.field_id, &request.key, None);
            continue;
        };

        let cropper = Arc::clone(&collaborators.cropper);
        let weak = weak.clone();
        tokio::spawn(async move {
            let image = match cropper.crop(data, regions).await {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!(
                        field_id = %request.field_id,
                        image_id = %request.key.image_id,
                        error = %e,
                        "Crop render failed"
                    );
                    None
                }
            };

            if let Some(tx) = weak.upgrade() {
                let _ = tx
                    .send(Command::CropFinished {
                        field_id: request.field_id,
                        key: request.key,
                        image,
                    })
                    .await;
            }
        });
    }
}
