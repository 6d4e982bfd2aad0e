//! Session script replay
//!
//! Replays a recorded sequence of scan results and user actions against a
//! `FormSession`. Images are named by labels in the script; recognition
//! output is given inline, so no scanner is involved. Crop requests are
//! completed with "no crop".

use crate::collaborators::ScanError;
use crate::error::{EngineError, EngineResult};
use crate::field::Field;
use crate::fill::ColumnChoice;
use crate::prefill::PrefillRecord;
use crate::scan::{DecodedBarcode, ScanOutput, ScanResult};
use crate::session::FormSession;
use crate::types::{Attribute, FieldId, ImageId};
use crate::value::FieldValue;
use foodform_common::config::EngineSettings;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReplayStep {
    /// New image with its recognition output (or a scan failure)
    AddImage {
        image: String,
        #[serde(default)]
        scan: Option<ScanResult>,
        #[serde(default)]
        barcodes: Vec<DecodedBarcode>,
        #[serde(default)]
        error: Option<String>,
    },
    SelectColumn {
        image: String,
        column: ColumnChoice,
    },
    RemoveImage {
        image: String,
    },
    Prefill {
        record: PrefillRecord,
    },
    /// User typed a value
    Type {
        attribute: Attribute,
        value: FieldValue,
    },
    /// User picked the n-th offered option
    Accept {
        attribute: Attribute,
        option: usize,
    },
    Discard {
        attribute: Attribute,
    },
    DiscardAll,
    RemoveBarcode {
        payload: String,
    },
}

/// Runs script steps against one session
pub struct Replayer {
    session: FormSession,
    images: HashMap<String, ImageId>,
}

impl Replayer {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            session: FormSession::new(settings),
            images: HashMap::new(),
        }
    }

    pub fn session(&self) -> &FormSession {
        &self.session
    }

    pub fn into_session(self) -> FormSession {
        self.session
    }

    pub fn run(&mut self, script: &ReplayScript) -> EngineResult<()> {
        for (index, step) in script.steps.iter().enumerate() {
            debug!(step = index, ?step, "Replaying step");
            self.apply(step)?;
        }
        info!(steps = script.steps.len(), "Replay finished");
        Ok(())
    }

    fn image(&self, label: &str) -> EngineResult<ImageId> {
        self.images.get(label).copied().ok_or_else(|| {
            EngineError::Common(foodform_common::Error::NotFound(format!("image '{}'", label)))
        })
    }

    /// Field for `attribute`; repeatable attributes get a new field when
    /// none is empty
    fn field_id(&mut self, attribute: Attribute) -> EngineResult<FieldId> {
        if attribute.is_repeatable() {
            if let Some(field) = self
                .session
                .fields_for(attribute)
                .into_iter()
                .find(|f| f.is_empty())
            {
                return Ok(field.id());
            }
            return Ok(match attribute {
                Attribute::Size => self.session.add_size(),
                _ => self.session.add_barcode_field(),
            });
        }
        self.session
            .field_for(attribute)
            .map(Field::id)
            .ok_or(EngineError::AttributeNotFound(attribute))
    }

    /// Existing field for `attribute`, never creating one
    fn existing_field_id(&self, attribute: Attribute) -> EngineResult<FieldId> {
        self.session
            .field_for(attribute)
            .map(Field::id)
            .ok_or(EngineError::AttributeNotFound(attribute))
    }

    pub fn apply(&mut self, step: &ReplayStep) -> EngineResult<()> {
        match step {
            ReplayStep::AddImage {
                image,
                scan,
                barcodes,
                error,
            } => {
                let image_id = self.session.add_image(Arc::from(Vec::<u8>::new()));
                self.images.insert(image.clone(), image_id);
                self.session.mark_scan_started(image_id)?;
                let result = match error {
                    Some(message) => Err(ScanError::Recognition(message.clone())),
                    None => Ok(ScanOutput {
                        scan: scan.clone(),
                        barcodes: barcodes.clone(),
                    }),
                };
                if let Some(request) = self.session.apply_scan_result(image_id, result)? {
                    info!(
                        image = %image,
                        best_column = request.best_guess.number(),
                        "Image waits for a column choice"
                    );
                }
            }
            ReplayStep::SelectColumn { image, column } => {
                let image_id = self.image(image)?;
                self.session.select_column(image_id, *column)?;
            }
            ReplayStep::RemoveImage { image } => {
                let image_id = self.image(image)?;
                self.session.remove_image(image_id)?;
            }
            ReplayStep::Prefill { record } => {
                self.session.apply_prefill(record.clone())?;
            }
            ReplayStep::Type { attribute, value } => {
                let field_id = self.field_id(*attribute)?;
                self.session.register_user_input(field_id, value.clone())?;
            }
            ReplayStep::Accept { attribute, option } => {
                let field_id = self.existing_field_id(*attribute)?;
                let options = self.session.options_for(field_id)?;
                let chosen = options.get(*option).ok_or_else(|| {
                    EngineError::Common(foodform_common::Error::InvalidInput(format!(
                        "{} has {} options, no option {}",
                        attribute,
                        options.len(),
                        option
                    )))
                })?;
                self.session.accept_option(field_id, chosen)?;
            }
            ReplayStep::Discard { attribute } => {
                let field_id = self.existing_field_id(*attribute)?;
                self.session.discard_scan(field_id)?;
            }
            ReplayStep::DiscardAll => {
                self.session.discard_all_scanned();
            }
            ReplayStep::RemoveBarcode { payload } => {
                self.session.remove_barcode(payload);
            }
        }

        for request in self.session.take_crop_requests() {
            self.session.complete_crop(request.field_id, &request.key, None);
        }
        Ok(())
    }
}

/// Replay `script` on a fresh session
pub fn replay(script: &ReplayScript, settings: EngineSettings) -> EngineResult<FormSession> {
    let mut replayer = Replayer::new(settings);
    replayer.run(script)?;
    Ok(replayer.into_session())
}
