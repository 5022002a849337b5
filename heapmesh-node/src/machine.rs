use crate::client::{is_success, HttpClient};
use crate::context::Context;
use anyhow::Result;
use heapmesh_common::config::peer_host;
use heapmesh_common::registry::Command;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Joining,
    Idle,
    Follower,
    Candidate,
    Leader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(State),
    /// The state has no behavior yet; the machine stays where it is.
    NotSupported(State),
}

impl Transition {
    pub fn state(self) -> State {
        match self {
            Transition::Next(state) | Transition::NotSupported(state) => state,
        }
    }
}

/// What a transition is decided on, observed after the state's action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    pub known_peers: usize,
    pub configured_peers: usize,
}

/// Joining converges on a cardinality check: the local registry holds as many
/// peers as are configured. Nothing records which peers acknowledged this
/// node, so one unreachable peer keeps the node joining forever.
pub fn transition(state: State, env: &Environment) -> Transition {
    match state {
        State::Joining if env.known_peers == env.configured_peers => Transition::Next(State::Idle),
        State::Joining => Transition::Next(State::Joining),
        State::Idle => Transition::Next(State::Idle),
        State::Follower | State::Candidate | State::Leader => Transition::NotSupported(state),
    }
}

/// `step - random(0, step)`, so nodes started together do not poll in lockstep.
pub fn jitter(step: Duration) -> Duration {
    let step_ms = step.as_millis() as u64;

    if step_ms == 0 {
        return step;
    }

    Duration::from_millis(step_ms - rand::thread_rng().gen_range(0..step_ms))
}

pub struct Machine {
    state: State,
    client: HttpClient,
    ctx: Arc<Context>,
}

impl Machine {
    pub fn new(ctx: Arc<Context>) -> Result<Self> {
        Ok(Machine {
            state: State::Joining,
            client: HttpClient::new(ctx.config.clone())?,
            ctx,
        })
    }

    /// Starts in `state` instead of joining.
    pub fn starting_at(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// One tick: run the current state's action, then move to the next state.
    pub async fn step(&mut self) -> Transition {
        match self.state {
            State::Joining => self.joining().await,
            State::Idle => self.idle().await,
            State::Follower | State::Candidate | State::Leader => {}
        }

        let env = Environment {
            known_peers: self.ctx.registry.len(),
            configured_peers: self.ctx.config.peers.len(),
        };

        let next = transition(self.state, &env);

        match next {
            Transition::Next(state) if state != self.state => {
                info!("{:?} -> {:?}", self.state, state)
            }
            Transition::NotSupported(state) => warn!("{:?} is not supported yet", state),
            Transition::Next(_) => {}
        }

        self.state = next.state();
        next
    }

    pub async fn run(mut self) {
        info!("starting state machine in {:?}", self.state);

        let lifecycle = self.ctx.lifecycle.clone();

        while lifecycle.is_alive() {
            tokio::select! {
                _ = tokio::time::sleep(jitter(self.ctx.config.step_time)) => {}
                _ = lifecycle.stopped() => break,
            }

            self.step().await;
        }

        info!("state machine stopped");
    }

    async fn joining(&self) {
        for peer in self.ctx.config.peers.iter() {
            let url = self.ctx.config.peer_url(peer, "/join");

            match self.client.join(peer).await {
                Ok((status, body)) if is_success(status) => {
                    info!("{} - {} - {}", url, status, body.trim())
                }
                Ok((status, _)) => info!("{} - {}", url, status),
                Err(e) => warn!("{} - {}", url, e),
            }
        }
    }

    async fn idle(&self) {
        debug!("idle...");

        let mut polls = JoinSet::new();

        for peer in self.ctx.config.peers.iter().cloned() {
            let client = self.client.clone();
            polls.spawn(async move {
                let status = client.poll(&peer).await;
                (peer, status)
            });
        }

        while let Some(joined) = polls.join_next().await {
            let (peer, status) = match joined {
                Ok(polled) => polled,
                Err(e) => {
                    error!("poll task failed: {}", e);
                    continue;
                }
            };

            match status {
                Ok(status) if is_success(status) => {
                    debug!("{} - {}", peer, status);
                    self.ctx.executor.execute(Command::Touch {
                        ip_address: peer_host(&peer),
                        at: chrono::Utc::now().timestamp(),
                    });
                }
                Ok(status) => warn!("{} - heartbeat answered {}", peer, status),
                Err(e) => warn!("{} - heartbeat failed: {}", peer, e),
            }
        }
    }
}
