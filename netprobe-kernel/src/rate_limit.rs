/**
 * RATE LIMITER - Fenêtre glissante par client
 *
 * RÔLE :
 * Décide pour chaque requête entrante si le client (IP ou x-forwarded-for)
 * peut passer, en comptant ses requêtes admises sur les N dernières secondes.
 *
 * FONCTIONNEMENT :
 * - Une fenêtre par client : timestamps des requêtes admises, dans l'ordre d'arrivée
 * - Avant chaque décision, les timestamps sortis de la fenêtre sont purgés
 * - Une requête rejetée n'est jamais comptée (pas de consommation de quota)
 * - Table bornée à `max_clients` : purge des fenêtres périmées puis éviction LRU
 * - Sweeper périodique pour libérer les clients inactifs
 */

use crate::config::RateLimitConf;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject,
}

#[derive(Debug)]
struct ClientWindow {
    hits: VecDeque<Instant>,
    last_seen: Instant,
}

impl ClientWindow {
    fn new(now: Instant) -> Self {
        Self { hits: VecDeque::new(), last_seen: now }
    }

    // hits est trié, on dépile par l'avant
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        self.hits
            .back()
            .map_or(true, |&last| now.saturating_duration_since(last) >= window)
    }
}

pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    max_clients: usize,
    clients: Mutex<HashMap<String, ClientWindow>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            max_clients: usize::MAX,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(conf: &RateLimitConf) -> Self {
        Self::new(conf.window(), conf.max_requests).with_max_clients(conf.max_clients)
    }

    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients.max(1);
        self
    }

    /// Admet ou rejette une requête de `client_id` arrivée à `now`.
    /// Seules les requêtes admises sont enregistrées dans la fenêtre.
    pub fn check(&self, client_id: &str, now: Instant) -> Admission {
        let mut clients = self.clients.lock();

        if !clients.contains_key(client_id) && clients.len() >= self.max_clients {
            self.make_room(&mut clients, now);
        }

        let window = clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientWindow::new(now));
        // `now` est lu avant le lock : deux requêtes concurrentes peuvent arriver
        // dans le désordre, on garde la fenêtre croissante
        let now = window.hits.back().map_or(now, |&last| now.max(last));
        window.prune(now, self.window);
        window.last_seen = now;

        if window.hits.len() >= self.max_requests {
            warn!(client_id, "rate limit triggered");
            return Admission::Reject;
        }

        window.hits.push_back(now);
        debug!(client_id, count = window.hits.len(), "request admitted");
        Admission::Admit
    }

    /// Supprime les clients dont la fenêtre ne contient plus aucune requête récente.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, w| !w.is_stale(now, self.window));
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }

    fn make_room(&self, clients: &mut HashMap<String, ClientWindow>, now: Instant) {
        clients.retain(|_, w| !w.is_stale(now, self.window));
        if clients.len() < self.max_clients {
            return;
        }

        let lru = clients
            .iter()
            .min_by_key(|(_, w)| w.last_seen)
            .map(|(id, _)| id.clone());
        if let Some(id) = lru {
            debug!(client_id = %id, "evicting least recently seen client");
            clients.remove(&id);
        }
    }

    /// Démarre la purge périodique des fenêtres périmées
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = limiter.sweep(Instant::now());
                if removed > 0 {
                    debug!(removed, remaining = limiter.tracked_clients(), "swept idle rate-limit windows");
                }
            }
        })
    }
}
