/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: dispatcher.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 14:20:11
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-05 11:02:36
 */

//! Replays archived mails against an SMTP server in fixed size batches.
//!
//! Every job `i` is bound to connection slot `i % max_concurrency`. A batch
//! holds at most `max_concurrency` jobs, so each slot is used by exactly one
//! task at a time; the session is moved into that task and handed back when
//! the batch is joined. The next batch is not resolved before the previous
//! one has finished.

use crate::archive::{self, ArchiveError};
use crate::catalog::MessageSource;
use crate::config::{DispatchConfig, ServerConfig};
use crate::recipients::{RecipientTarget, Recipients};
use crate::smtp_sender::{LettreSessionFactory, build_envelope, sender_address};
use crate::traits::{Email, SmtpSession, SmtpSessionFactory};
use futures::future::join_all;
use lettre::Address;
use lettre::address::Envelope;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Read(#[from] ArchiveError),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("send task aborted: {0}")]
    Task(String),
}

/// What happened to a single job.
#[derive(Debug)]
pub struct JobOutcome {
    pub index: usize,
    pub slot: usize,
    pub source: MessageSource,
    pub target: RecipientTarget,
    pub result: Result<(), DispatchError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    /// One entry per job, in job order
    pub outcomes: Vec<JobOutcome>,
    /// How many times all connections were torn down and rebuilt
    pub recycles: usize,
    pub elapsed: Duration,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

enum ConnectionSlot {
    Unestablished,
    Authenticated(Box<dyn SmtpSession>),
}

impl ConnectionSlot {
    fn take(&mut self) -> Option<Box<dyn SmtpSession>> {
        match std::mem::replace(self, ConnectionSlot::Unestablished) {
            ConnectionSlot::Authenticated(session) => Some(session),
            ConnectionSlot::Unestablished => None,
        }
    }
}

/// Slot a job runs on, independent of batch boundaries.
pub fn slot_for(index: usize, max_concurrency: usize) -> usize {
    index % max_concurrency
}

/// Makes sure every recipient is reached at least once.
///
/// With more recipients than sources the source list is extended from its
/// own start until both have the same length.
pub fn pad_sources<T: Clone>(sources: &[T], recipients: usize) -> Vec<T> {
    let mut padded = sources.to_vec();
    if !sources.is_empty() && recipients > sources.len() {
        padded.extend(sources.iter().cycle().take(recipients - sources.len()).cloned());
    }
    padded
}

type JobResult = (Option<Box<dyn SmtpSession>>, Result<(), DispatchError>);

struct RunningJob {
    index: usize,
    slot: usize,
    source: MessageSource,
    target: RecipientTarget,
    handle: Option<JoinHandle<JobResult>>,
    // Set when the job failed before a task was spawned
    early: Option<DispatchError>,
}

pub struct Dispatcher {
    server: Arc<ServerConfig>,
    sender: Address,
    max_concurrency: usize,
    recycle_threshold: usize,
    send_timeout: Option<Duration>,
    factory: Arc<dyn SmtpSessionFactory>,
}

impl Dispatcher {
    pub fn new(server: ServerConfig, policy: &DispatchConfig) -> anyhow::Result<Self> {
        Self::new_with_factory(server, policy, Arc::new(LettreSessionFactory))
    }

    pub fn new_with_factory(
        server: ServerConfig,
        policy: &DispatchConfig,
        factory: Arc<dyn SmtpSessionFactory>,
    ) -> anyhow::Result<Self> {
        let sender = sender_address(&server)?;
        Ok(Self {
            server: Arc::new(server),
            sender,
            max_concurrency: policy.max_concurrency.max(1),
            recycle_threshold: policy.recycle_threshold(),
            send_timeout: policy.send_timeout(),
            factory,
        })
    }

    /// Sends every source, pairing them with recipients round robin or, when
    /// `broadcast` is set, sending each one to the whole list at once.
    pub async fn send_all(
        &self,
        recipients: &Recipients,
        sources: &[MessageSource],
        broadcast: bool,
    ) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::default();

        if sources.is_empty() {
            info!("No mail to send");
            return report;
        }

        let sources = pad_sources(sources, recipients.len());
        let total = sources.len();
        let mut slots: Vec<ConnectionSlot> = (0..self.max_concurrency)
            .map(|_| ConnectionSlot::Unestablished)
            .collect();
        let mut since_recycle = 0usize;

        for (batch_no, batch) in sources.chunks(self.max_concurrency).enumerate() {
            let mut running = Vec::with_capacity(batch.len());

            for (offset, source) in batch.iter().enumerate() {
                let index = batch_no * self.max_concurrency + offset;
                let slot = slot_for(index, self.max_concurrency);
                let target = recipients.target_for(index, broadcast);

                running.push(self.launch(index, slot, source, target, &mut slots).await);
                info!("send mail : [{}/{}] {}", index, total, source);
                since_recycle += 1;
            }

            self.join_batch(running, &mut slots, total, &mut report).await;

            if since_recycle > self.recycle_threshold {
                debug!(
                    "Recycling {} connections after {} jobs",
                    self.max_concurrency, since_recycle
                );
                close_all(&mut slots).await;
                since_recycle = 0;
                report.recycles += 1;
            }
        }

        close_all(&mut slots).await;
        report.elapsed = started.elapsed();
        report
    }

    /// Reads the message and spawns its send task.
    async fn launch(
        &self,
        index: usize,
        slot: usize,
        source: &MessageSource,
        target: RecipientTarget,
        slots: &mut [ConnectionSlot],
    ) -> RunningJob {
        let mut job = RunningJob {
            index,
            slot,
            source: source.clone(),
            target,
            handle: None,
            early: None,
        };

        let content = match read_message(source).await {
            Ok(content) => content,
            Err(e) => {
                // Skipped, reported with the rest of the batch
                job.early = Some(e);
                return job;
            }
        };

        let envelope = match build_envelope(&self.sender, &job.target) {
            Ok(envelope) => envelope,
            Err(e) => {
                job.early = Some(DispatchError::Send(format!("{:#}", e)));
                return job;
            }
        };

        let email = Email {
            id: source.to_string(),
            content,
        };
        let session = slots[slot].take();
        let factory = self.factory.clone();
        let server = self.server.clone();
        let send_timeout = self.send_timeout;

        job.handle = Some(tokio::spawn(async move {
            let work = deliver(factory, server, session, envelope, email);
            match send_timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    // The session is dropped together with the future
                    Err(_) => (None, Err(DispatchError::Timeout(limit))),
                },
                None => work.await,
            }
        }));

        job
    }

    /// Waits for every task of the batch and hands healthy sessions back to
    /// their slots.
    async fn join_batch(
        &self,
        running: Vec<RunningJob>,
        slots: &mut [ConnectionSlot],
        total: usize,
        report: &mut DispatchReport,
    ) {
        let mut finished = Vec::with_capacity(running.len());
        let mut jobs = Vec::with_capacity(running.len());
        let mut handles = Vec::with_capacity(running.len());
        for mut job in running {
            match job.handle.take() {
                Some(handle) => {
                    handles.push(handle);
                    jobs.push(job);
                }
                None => {
                    let result = job.early.take().map_or(Ok(()), Err);
                    finished.push((job, result));
                }
            }
        }

        for (job, joined) in jobs.into_iter().zip(join_all(handles).await) {
            let result = match joined {
                Ok((Some(session), result)) => {
                    slots[job.slot] = ConnectionSlot::Authenticated(session);
                    result
                }
                Ok((None, result)) => result,
                Err(e) => Err(DispatchError::Task(e.to_string())),
            };
            finished.push((job, result));
        }

        finished.sort_by_key(|(job, _)| job.index);
        for (job, result) in finished {
            let outcome = JobOutcome {
                index: job.index,
                slot: job.slot,
                source: job.source,
                target: job.target,
                result,
            };

            match &outcome.result {
                Ok(()) => debug!(
                    "[{}/{}] Sent {} to {} on slot {}",
                    outcome.index, total, outcome.source, outcome.target, outcome.slot
                ),
                Err(e) => error!(
                    "[{}/{}] Failed to send {} to {}: {}",
                    outcome.index, total, outcome.source, outcome.target, e
                ),
            }
            report.outcomes.push(outcome);
        }
    }
}

async fn read_message(source: &MessageSource) -> Result<Vec<u8>, DispatchError> {
    if source.compressed {
        debug!("Unpacking {}", source);
    }
    let path = source.path.clone();
    let content = tokio::task::spawn_blocking(move || archive::extract(&path))
        .await
        .map_err(|e| DispatchError::Task(e.to_string()))??;
    Ok(content)
}

/// Runs inside the job's task. A session that saw an error is not handed back.
async fn deliver(
    factory: Arc<dyn SmtpSessionFactory>,
    server: Arc<ServerConfig>,
    session: Option<Box<dyn SmtpSession>>,
    envelope: Envelope,
    email: Email,
) -> JobResult {
    let mut session = match session {
        Some(session) => session,
        None => match factory.connect(&server).await {
            Ok(session) => session,
            Err(e) => return (None, Err(DispatchError::Connect(format!("{:#}", e)))),
        },
    };

    match session.send(&envelope, &email).await {
        Ok(()) => (Some(session), Ok(())),
        Err(e) => (None, Err(DispatchError::Send(format!("{:#}", e)))),
    }
}

async fn close_all(slots: &mut [ConnectionSlot]) {
    let closing = slots
        .iter_mut()
        .filter_map(ConnectionSlot::take)
        .map(|mut session| async move {
            if let Err(e) = session.close().await {
                warn!("Failed to close connection: {:#}", e);
            }
        });

    join_all(closing).await;
}

#[cfg(test)]
#[path = "./dispatcher_tests.rs"]
mod dispatcher_tests;
