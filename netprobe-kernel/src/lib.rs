/**
 * NETPROBE KERNEL - Diagnostics réseau à la demande
 *
 * RÔLE : ping / nmap contre un hôte cible via HTTP, historique des résultats,
 * protection contre les rafales de requêtes (rate limiting par client).
 *
 * PIPELINE : rate_limit -> execution -> recorder -> store, orchestré par dispatcher.
 */

pub mod config;
pub mod dispatcher;
pub mod execution;
pub mod http;
pub mod models;
pub mod rate_limit;
pub mod recorder;
pub mod store;
