use crate::output::{KeyGenerator, PendingRecord};
use crate::processor::RecordProcessor;
use crate::registry::HandlerRegistry;
use crate::state::{
    ElementInstance, EngineState, EventTrigger, Job, MessageSubscription, Purpose, StoredRecord,
    TimerSubscription,
};
use bpmncore::{
    BpmnElementType, Catalog, EngineError, EventDefinition, ExecutableProcess,
    FlowElementDefinition, Intent, Key, ProcessDefinition, Record, RecordBus, Result,
    WorkflowError, WorkflowInstanceRecord,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Configuration for the engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Records one call to [`Engine::run`] may process before the partition halts.
    pub max_records_per_run: usize,
    pub exporter_buffer_size: usize,
    /// Initial engine clock. Defaults to the Unix epoch.
    pub start_time: Option<DateTime<Utc>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_records_per_run: 100_000,
            exporter_buffer_size: 1_024,
            start_time: None,
        }
    }
}

/// A single partition: the record log, the state derived from it and the
/// processor that drives the log forward.
///
/// Commands append records to the log and then process it until no record is
/// left. Every committed record is published to the exporter bus.
pub struct Engine {
    config: EngineConfig,
    catalog: Catalog,
    state: EngineState,
    keys: KeyGenerator,
    processor: RecordProcessor,
    log: Vec<Record>,
    next_position: usize,
    bus: RecordBus,
    halted: Option<String>,
}

impl Engine {
    /// Create a new engine with default settings
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_registry(HandlerRegistry::standard(), config)
    }

    /// Create a new engine with a pre-configured handler registry
    pub fn with_registry(registry: HandlerRegistry, config: EngineConfig) -> Self {
        let clock = config.start_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let bus = RecordBus::new(config.exporter_buffer_size);
        Self {
            config,
            catalog: Catalog::new(),
            state: EngineState::new(clock),
            keys: KeyGenerator::new(),
            processor: RecordProcessor::new(registry),
            log: Vec::new(),
            next_position: 0,
            bus,
            halted: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.state.clock()
    }

    /// Every committed record, in log order.
    pub fn records(&self) -> &[Record] {
        &self.log
    }

    pub fn instance(&self, key: Key) -> Option<&ElementInstance> {
        self.state.instances.get_instance(key)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.state.jobs.jobs()
    }

    /// Subscribe to committed records
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Record> {
        self.bus.subscribe()
    }

    /// Why processing stopped, if it did.
    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Deploy a process definition as a new version of its process id.
    ///
    /// Timer and message start events of the new version replace the start
    /// subscriptions of the previous one.
    pub fn deploy(&mut self, definition: &ProcessDefinition) -> Result<Arc<ExecutableProcess>> {
        self.ensure_running()?;
        let timers = self.start_timers(definition)?;
        let previous = self.catalog.latest_by_process_id(&definition.id);
        let key = self.keys.next_key();
        let process = self.catalog.deploy(key, definition)?;

        if let Some(previous) = previous {
            self.state
                .subscriptions
                .close_workflow_start_events(previous.key);
        }
        for (element_id, due) in timers {
            let timer = TimerSubscription {
                key: self.keys.next_key(),
                workflow_key: process.key,
                element_id,
                scope_key: None,
                due,
            };
            self.state.subscriptions.open_timer(timer);
        }
        for start_event in process.start_events() {
            match &start_event.definition {
                EventDefinition::Message { name, .. } => {
                    let subscription = MessageSubscription {
                        key: self.keys.next_key(),
                        workflow_key: process.key,
                        element_id: start_event.id.clone(),
                        scope_key: None,
                        message_name: name.clone(),
                        correlation_key: None,
                        close_on_correlate: false,
                    };
                    self.state.subscriptions.open_message(subscription);
                }
                EventDefinition::Timer { .. } | EventDefinition::None => {}
            }
        }
        Ok(process)
    }

    /// Due dates of the timer start events of a definition about to be deployed.
    fn start_timers(&self, definition: &ProcessDefinition) -> Result<Vec<(String, DateTime<Utc>)>> {
        let mut timers = Vec::new();
        for element in &definition.elements {
            if let FlowElementDefinition::StartEvent {
                id,
                event: event @ EventDefinition::Timer { .. },
                ..
            } = element
            {
                let due = self.state.timer_due(id, event).map_err(|e| {
                    WorkflowError::InvalidStartEvents {
                        scope: definition.id.clone(),
                        reason: e.to_string(),
                    }
                })?;
                timers.push((id.clone(), due));
            }
        }
        Ok(timers)
    }

    /// Start an instance of the latest version through its none start event.
    pub fn create_instance(
        &mut self,
        bpmn_process_id: &str,
        variables: serde_json::Value,
    ) -> Result<Key> {
        self.ensure_running()?;
        let process = self
            .catalog
            .latest_by_process_id(bpmn_process_id)
            .ok_or_else(|| WorkflowError::NotFound(bpmn_process_id.to_string()))?;
        if process.none_start_event().is_none() {
            return Err(WorkflowError::NoNoneStartEvent(bpmn_process_id.to_string()).into());
        }

        let key = self.keys.next_key();
        self.state.variables.merge(key, &variables);
        tracing::info!(key, bpmn_process_id, version = process.version, "Creating workflow instance");
        self.commit_command(vec![PendingRecord {
            key,
            intent: Intent::ElementActivating,
            value: root_value(&process, key),
        }])?;
        self.run()?;
        Ok(key)
    }

    /// Correlate a message to every open subscription that matches it.
    /// Returns the number of subscriptions it was correlated to.
    pub fn publish_message(
        &mut self,
        name: &str,
        correlation_key: &str,
        payload: serde_json::Value,
    ) -> Result<usize> {
        self.ensure_running()?;
        let subscriptions = self.state.subscriptions.correlate(name, correlation_key);
        tracing::debug!(message_name = name, correlation_key, matches = subscriptions.len(), "Publishing message");

        for subscription in &subscriptions {
            if subscription.close_on_correlate {
                self.state.subscriptions.close_message(subscription.key);
            }
            self.trigger_start_event(
                subscription.workflow_key,
                subscription.scope_key,
                &subscription.element_id,
                payload.clone(),
            )?;
        }
        self.run()?;
        Ok(subscriptions.len())
    }

    /// Move the engine clock forward and fire the timers that became due.
    /// Returns the number of fired timers.
    pub fn increase_time(&mut self, by: std::time::Duration) -> Result<usize> {
        self.ensure_running()?;
        let by = chrono::Duration::from_std(by)
            .map_err(|e| EngineError::Command(format!("invalid duration: {}", e)))?;
        if !self.state.advance_clock(by) {
            return Err(EngineError::Command(format!(
                "cannot advance the clock from {} by {}",
                self.state.clock(),
                by
            )));
        }

        let due = self.state.subscriptions.take_due_timers(self.state.clock());
        for timer in &due {
            tracing::debug!(key = timer.key, element_id = %timer.element_id, "Timer fired");
            self.trigger_start_event(
                timer.workflow_key,
                timer.scope_key,
                &timer.element_id,
                serde_json::Value::Null,
            )?;
        }
        self.run()?;
        Ok(due.len())
    }

    /// Complete the job of an active service task, merging `variables` into its scope.
    pub fn complete_job(&mut self, job_key: Key, variables: serde_json::Value) -> Result<()> {
        self.ensure_running()?;
        let task = self
            .state
            .instances
            .get_instance(job_key)
            .filter(|task| task.is_active() && self.state.jobs.get(job_key).is_some())
            .ok_or_else(|| EngineError::Command(format!("no active job with key {}", job_key)))?;
        let value = task.value().clone();

        self.state.jobs.remove(job_key);
        if let Some(scope_key) = value.flow_scope_key {
            self.state.variables.merge(scope_key, &variables);
        }
        self.commit_command(vec![PendingRecord {
            key: job_key,
            intent: Intent::ElementCompleting,
            value,
        }])?;
        self.run()?;
        Ok(())
    }

    /// Terminate a running workflow instance.
    pub fn cancel_instance(&mut self, workflow_instance_key: Key) -> Result<()> {
        self.ensure_running()?;
        let instance = self
            .state
            .instances
            .get_instance(workflow_instance_key)
            .filter(|instance| instance.flow_scope_key().is_none() && instance.can_terminate())
            .ok_or_else(|| {
                EngineError::Command(format!(
                    "no running workflow instance with key {}",
                    workflow_instance_key
                ))
            })?;
        let value = instance.value().clone();

        tracing::info!(key = workflow_instance_key, "Cancelling workflow instance");
        self.commit_command(vec![PendingRecord {
            key: workflow_instance_key,
            intent: Intent::ElementTerminating,
            value,
        }])?;
        self.run()?;
        Ok(())
    }

    /// Write every parked, unhandled record back to the log. Returns how many were retried.
    pub fn retry_failed_records(&mut self) -> Result<usize> {
        self.ensure_running()?;
        let mut retried = Vec::new();
        for scope_key in self.state.deferred.scopes_with_failed_records() {
            let keys: Vec<Key> = self
                .state
                .deferred
                .get_failed_records(scope_key)
                .iter()
                .map(|record| record.key)
                .collect();
            for key in keys {
                if let Some(failed) =
                    self.state
                        .deferred
                        .remove_stored_record(scope_key, key, Purpose::Failed)
                {
                    retried.push(PendingRecord {
                        key: failed.key,
                        intent: failed.intent,
                        value: failed.value,
                    });
                }
            }
        }

        let count = retried.len();
        if count > 0 {
            tracing::info!(count, "Retrying failed records");
            self.commit_command(retried)?;
            self.run()?;
        }
        Ok(count)
    }

    /// Process the log until every committed record has been processed.
    /// Returns the number of processed records.
    pub fn run(&mut self) -> Result<usize> {
        self.ensure_running()?;
        let mut processed = 0;
        while self.next_position < self.log.len() {
            if processed >= self.config.max_records_per_run {
                return Err(self.halt(EngineError::RecordLimitExceeded {
                    limit: self.config.max_records_per_run,
                }));
            }
            let record = self.log[self.next_position].clone();
            self.next_position += 1;
            processed += 1;

            let result = self
                .processor
                .process(&record, &self.catalog, &mut self.state, &mut self.keys);
            let processed_record = match result {
                Ok(processed_record) => processed_record,
                Err(error) => return Err(self.halt(error)),
            };
            tracing::debug!(
                record = %record,
                outcome = ?processed_record.outcome,
                written = processed_record.written.len(),
                "Processed record"
            );
            if let Err(error) = self.commit(processed_record.written, Some(record.position)) {
                return Err(self.halt(error));
            }
        }
        Ok(processed)
    }

    fn ensure_running(&self) -> Result<()> {
        match &self.halted {
            Some(reason) => Err(EngineError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    fn halt(&mut self, error: EngineError) -> EngineError {
        if error.is_fatal() {
            tracing::error!(error = %error, "Processing halted");
            self.halted = Some(error.to_string());
        }
        error
    }

    fn commit_command(&mut self, records: Vec<PendingRecord>) -> Result<()> {
        match self.commit(records, None) {
            Ok(()) => Ok(()),
            Err(error) => Err(self.halt(error)),
        }
    }

    /// Apply each record to the state, append it to the log and export it.
    fn commit(&mut self, records: Vec<PendingRecord>, source_position: Option<u64>) -> Result<()> {
        for pending in records {
            self.state.apply(&pending)?;
            let record = Record {
                position: self.log.len() as u64 + 1,
                key: pending.key,
                source_position,
                intent: pending.intent,
                value: pending.value,
                timestamp: self.state.clock(),
            };
            self.bus.publish(&record);
            self.log.push(record);
        }
        Ok(())
    }

    /// Record the occurrence of a start event: inside `scope_key` for an event
    /// sub-process, as a new workflow instance for a process start event.
    fn trigger_start_event(
        &mut self,
        workflow_key: Key,
        scope_key: Option<Key>,
        element_id: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        match scope_key {
            Some(scope_key) => self.trigger_event_sub_process(scope_key, element_id, payload),
            None => {
                let process = self
                    .catalog
                    .get(workflow_key)
                    .ok_or_else(|| WorkflowError::NotFound(workflow_key.to_string()))?;
                self.instantiate_at(&process, element_id, payload).map(|_| ())
            }
        }
    }

    fn trigger_event_sub_process(
        &mut self,
        scope_key: Key,
        element_id: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let Some(scope) = self.state.instances.get_instance(scope_key) else {
            tracing::debug!(scope_key, element_id, "Scope already left, event dropped");
            return Ok(());
        };
        let value = scope
            .value()
            .for_element(element_id, BpmnElementType::StartEvent, Some(scope_key));

        let event_key = self.keys.next_key();
        self.state.triggers.trigger(
            scope_key,
            EventTrigger {
                event_key,
                element_id: element_id.to_string(),
                payload,
            },
        );
        self.commit_command(vec![PendingRecord {
            key: event_key,
            intent: Intent::EventOccurred,
            value,
        }])
    }

    /// Create a workflow instance whose start path is the given start event.
    /// The activation of the start event is deferred until the process is active.
    fn instantiate_at(
        &mut self,
        process: &ExecutableProcess,
        start_event_id: &str,
        payload: serde_json::Value,
    ) -> Result<Key> {
        let key = self.keys.next_key();
        let value = root_value(process, key);
        self.state.variables.merge(key, &payload);

        let start_value =
            value.for_element(start_event_id, BpmnElementType::StartEvent, Some(key));
        self.state.deferred.store_record(
            key,
            StoredRecord {
                key: self.keys.next_key(),
                intent: Intent::ElementActivating,
                value: start_value,
                purpose: Purpose::Deferred,
                trigger: None,
            },
        );

        tracing::info!(
            key,
            bpmn_process_id = %process.bpmn_process_id,
            start_event = start_event_id,
            "Creating workflow instance at start event"
        );
        self.commit_command(vec![PendingRecord {
            key,
            intent: Intent::ElementActivating,
            value,
        }])?;
        Ok(key)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn root_value(process: &ExecutableProcess, workflow_instance_key: Key) -> WorkflowInstanceRecord {
    WorkflowInstanceRecord {
        bpmn_process_id: process.bpmn_process_id.clone(),
        workflow_key: process.key,
        version: process.version,
        workflow_instance_key,
        element_id: process.bpmn_process_id.clone(),
        bpmn_element_type: BpmnElementType::Process,
        flow_scope_key: None,
    }
}
