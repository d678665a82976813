/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: traits.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 10:31:05
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-05 09:12:44
 */

use crate::config::ServerConfig;
use async_trait::async_trait;
use lettre::address::Envelope;

#[derive(Debug, Clone)]
pub struct Email {
    /// Where the message came from, used in logs and reports
    pub id: String,
    pub content: Vec<u8>,
}

/// An established, authenticated SMTP connection that can carry many mails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmtpSession: Send {
    /// Sends raw message bytes with the given envelope
    async fn send(&mut self, envelope: &Envelope, email: &Email) -> anyhow::Result<()>;

    /// Says goodbye to the server, the session is unusable afterwards
    async fn close(&mut self) -> anyhow::Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmtpSessionFactory: Send + Sync {
    /// Connects and authenticates a new session
    async fn connect(&self, config: &ServerConfig) -> anyhow::Result<Box<dyn SmtpSession>>;
}
