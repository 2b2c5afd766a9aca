//! Subcommand implementations.

use std::thread;
use std::time::{Duration, Instant};

use agentage_core::device::PollDisposition;
use log::debug;

use crate::client::{ApiClient, PollOutcome};
use crate::credentials::{CredentialStore, Credentials};
use crate::{Error, Result};

/// Added to the poll interval on every `slow_down`.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// What the login loop does after a rejected poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPoll {
    After(Duration),
    Stop,
}

/// Next wait for a poll rejected with `disposition`, per RFC 8628 §3.5.
pub fn next_poll(interval: Duration, disposition: PollDisposition) -> NextPoll {
    match disposition {
        PollDisposition::KeepPolling => NextPoll::After(interval),
        PollDisposition::SlowDown => NextPoll::After(interval + SLOW_DOWN_STEP),
        PollDisposition::Restart | PollDisposition::Fail => NextPoll::Stop,
    }
}

pub fn login(client: &ApiClient, store: &CredentialStore) -> Result<()> {
    let code = client.request_device_code()?;

    println!();
    println!("  Open:       {}", code.verification_uri);
    println!("  Enter code: {}", code.user_code);
    println!();
    println!("  Or go straight to {}", code.verification_uri_complete);
    println!();
    println!(
        "Waiting for authorization (expires in {} minutes)...",
        code.expires_in / 60
    );

    let deadline = Instant::now() + Duration::from_secs(code.expires_in.max(0) as u64);
    let mut interval = Duration::from_secs(code.interval.max(1) as u64);

    loop {
        if Instant::now() + interval >= deadline {
            return Err(Error::LoginTimedOut);
        }
        thread::sleep(interval);

        match client.poll_token(&code.device_code)? {
            PollOutcome::Authorized(token) => {
                let credentials = Credentials {
                    api_url: client.base().to_string(),
                    access_token: token.access_token,
                    user: token.user,
                };
                store.save(&credentials)?;
                println!("Logged in as {}", credentials.user.email);
                debug!("credentials written to {}", store.path().display());
                return Ok(());
            }
            PollOutcome::Rejected(err) => match next_poll(interval, err.disposition()) {
                NextPoll::After(next) => {
                    if next != interval {
                        debug!("server asked to slow down, polling every {}s", next.as_secs());
                    }
                    interval = next;
                }
                NextPoll::Stop if err.disposition() == PollDisposition::Restart => {
                    return Err(Error::LoginRestart(err));
                }
                NextPoll::Stop => return Err(Error::Protocol(err)),
            },
        }
    }
}

pub fn whoami(client: &ApiClient, store: &CredentialStore) -> Result<()> {
    let credentials = store.load()?.ok_or(Error::NotLoggedIn)?;
    let me = client.me(&credentials.access_token)?;

    match &me.name {
        Some(name) => println!("{name} <{}>", me.email),
        None => println!("{}", me.email),
    }
    println!("  id:        {}", me.id);
    println!("  role:      {}", me.role);
    if !me.providers.is_empty() {
        println!("  providers: {}", me.providers.join(", "));
    }
    Ok(())
}

pub fn logout(store: &CredentialStore) -> Result<()> {
    if store.remove()? {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}
