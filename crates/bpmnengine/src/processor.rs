use crate::handlers::BpmnStepContext;
use crate::output::{KeyGenerator, PendingRecord, RecordWriter};
use crate::registry::HandlerRegistry;
use crate::state::{EngineState, Purpose, StoredRecord};
use bpmncore::{
    BpmnElementType, Catalog, ExecutableElement, ExecutableProcess, Intent, Record, Result,
    Violation, WorkflowInstanceRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// The handler ran and its records are to be committed.
    Handled,
    /// The handler declined; nothing it wrote is committed.
    NotHandled,
    /// The record no longer applies, or no handler is registered for it.
    Skipped,
}

#[derive(Debug)]
pub struct ProcessedRecord {
    pub outcome: ProcessingOutcome,
    pub written: Vec<PendingRecord>,
}

/// Routes one committed record to its lifecycle handler.
pub struct RecordProcessor {
    registry: HandlerRegistry,
}

impl RecordProcessor {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run the handler for `record`. The returned records are not yet applied to `state`.
    pub fn process(
        &self,
        record: &Record,
        catalog: &Catalog,
        state: &mut EngineState,
        keys: &mut KeyGenerator,
    ) -> Result<ProcessedRecord> {
        let value = &record.value;
        let process = catalog
            .get(value.workflow_key)
            .ok_or(Violation::UnknownWorkflow {
                workflow_key: value.workflow_key,
            })?;
        let element = resolve_element(&process, value)?;

        let Some(handler) = self.registry.get(value.bpmn_element_type, record.intent) else {
            tracing::warn!(
                key = record.key,
                "No handler for {} {}, skipping",
                value.bpmn_element_type,
                record.intent
            );
            return Ok(ProcessedRecord {
                outcome: ProcessingOutcome::Skipped,
                written: Vec::new(),
            });
        };

        let mut writer = RecordWriter::new(keys);
        let outcome = {
            let mut ctx = BpmnStepContext {
                key: record.key,
                intent: record.intent,
                value,
                process: &process,
                element,
                state: &mut *state,
                output: &mut writer,
            };
            if !(handler.should_handle)(&ctx) {
                ProcessingOutcome::Skipped
            } else if (handler.handle)(&mut ctx)? {
                ProcessingOutcome::Handled
            } else {
                ProcessingOutcome::NotHandled
            }
        };

        let written = match outcome {
            ProcessingOutcome::Handled => writer.into_pending(),
            ProcessingOutcome::NotHandled | ProcessingOutcome::Skipped => Vec::new(),
        };

        match outcome {
            ProcessingOutcome::Handled => {
                if matches!(
                    record.intent,
                    Intent::ElementCompleted | Intent::ElementTerminated
                ) {
                    state.remove_element_instance(record.key);
                }
            }
            ProcessingOutcome::NotHandled => park_failed(record, state),
            ProcessingOutcome::Skipped => {
                tracing::debug!(key = record.key, intent = %record.intent, "Record no longer applies");
            }
        }

        Ok(ProcessedRecord { outcome, written })
    }
}

impl Default for RecordProcessor {
    fn default() -> Self {
        Self::new(HandlerRegistry::standard())
    }
}

/// Keep an event occurrence that could not be handled, so it can be retried.
fn park_failed(record: &Record, state: &mut EngineState) {
    match (record.intent, record.value.flow_scope_key) {
        (Intent::EventOccurred, Some(scope_key)) => {
            tracing::warn!(key = record.key, scope_key, "Event occurrence not handled, parking it as failed");
            state.deferred.store_record(
                scope_key,
                StoredRecord {
                    key: record.key,
                    intent: record.intent,
                    value: record.value.clone(),
                    purpose: Purpose::Failed,
                    trigger: None,
                },
            );
        }
        _ => {
            tracing::debug!(key = record.key, intent = %record.intent, "Record not handled");
        }
    }
}

/// The element a record is about; the target element for a taken sequence flow.
pub(crate) fn resolve_element<'p>(
    process: &'p ExecutableProcess,
    value: &WorkflowInstanceRecord,
) -> Result<&'p ExecutableElement> {
    let unknown = |element_id: &str| Violation::UnknownElement {
        workflow_key: process.key,
        element_id: element_id.to_string(),
    };
    let element_id = match value.bpmn_element_type {
        BpmnElementType::SequenceFlow => process
            .sequence_flow(&value.element_id)
            .map(|flow| flow.target.as_str())
            .ok_or_else(|| unknown(&value.element_id))?,
        _ => value.element_id.as_str(),
    };
    Ok(process.element(element_id).ok_or_else(|| unknown(element_id))?)
}
