use bpmncore::Key;
use serde::Serialize;
use std::collections::BTreeMap;

/// Work item of an active service task. Its key is the task's element instance key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub key: Key,
    pub job_type: String,
    pub workflow_instance_key: Key,
    pub element_id: String,
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: BTreeMap<Key, Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, job: Job) {
        tracing::debug!(job_key = job.key, job_type = %job.job_type, "Created job");
        self.jobs.insert(job.key, job);
    }

    pub fn get(&self, key: Key) -> Option<&Job> {
        self.jobs.get(&key)
    }

    pub fn remove(&mut self, key: Key) -> Option<Job> {
        self.jobs.remove(&key)
    }

    /// Oldest job of the given type within a workflow instance.
    pub fn find(&self, workflow_instance_key: Key, job_type: &str) -> Option<&Job> {
        self.jobs
            .values()
            .find(|job| job.workflow_instance_key == workflow_instance_key && job.job_type == job_type)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }
}
