/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: smtp_sender.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 10:58:19
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-05 09:20:31
 */

use crate::config::ServerConfig;
use crate::recipients::RecipientTarget;
use crate::traits::{Email, SmtpSession, SmtpSessionFactory};
use async_trait::async_trait;
use lettre::Address;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use log::debug;

// Wrapper for a live Lettre connection
pub struct LettreSession {
    connection: AsyncSmtpConnection,
}

#[async_trait]
impl SmtpSession for LettreSession {
    async fn send(&mut self, envelope: &Envelope, email: &Email) -> anyhow::Result<()> {
        self.connection
            .send(envelope, &email.content)
            .await
            .map_err(|e| send_failure(email, e))?;
        debug!("Delivered {} ({} bytes)", email.id, email.content.len());
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.connection
            .quit()
            .await
            .map_err(|e| anyhow::anyhow!("SMTP quit error: {}", e))
            .map(|_| ())
    }
}

fn send_failure(email: &Email, e: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("SMTP send error for {}: {}", email.id, e)
}

pub struct LettreSessionFactory;

#[async_trait]
impl SmtpSessionFactory for LettreSessionFactory {
    async fn connect(&self, config: &ServerConfig) -> anyhow::Result<Box<dyn SmtpSession>> {
        let tls_params = if config.use_tls {
            Some(
                TlsParameters::new(config.host.clone())
                    .map_err(|e| anyhow::anyhow!("Invalid TLS parameters: {}", e))?,
            )
        } else {
            None
        };

        let mut connection = AsyncSmtpConnection::connect_tokio1(
            (config.host.as_str(), config.port),
            Some(config.connect_timeout()),
            &ClientId::default(),
            tls_params,
            None,
        )
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to connect to {}:{}: {}",
                config.host,
                config.port,
                e
            )
        })?;

        // Open relays in test labs usually take mail without a login
        if !config.username.is_empty() {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            connection
                .auth(&[Mechanism::Plain, Mechanism::Login], &creds)
                .await
                .map_err(|e| anyhow::anyhow!("Login failed for {}: {}", config.username, e))?;
        }

        debug!("Connected to {}:{}", config.host, config.port);
        Ok(Box::new(LettreSession { connection }))
    }
}

/// Builds the SMTP envelope for one job.
pub fn build_envelope(sender: &Address, target: &RecipientTarget) -> anyhow::Result<Envelope> {
    Envelope::new(Some(sender.clone()), target.addresses())
        .map_err(|e| anyhow::anyhow!("Invalid envelope: {}", e))
}

/// Parses the configured envelope sender.
pub fn sender_address(config: &ServerConfig) -> anyhow::Result<Address> {
    config
        .sender()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid sender address {:?}: {}", config.sender(), e))
}

#[cfg(test)]
#[path = "./smtp_sender_tests.rs"]
mod smtp_sender_tests;
