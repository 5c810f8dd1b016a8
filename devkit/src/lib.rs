/*!
# Pingport DevKit - Stubs et Utilitaires pour les tests

Bibliothèque facilitant les tests du scheduler pingport avec:
- Store de séries en mémoire, horloge virtuelle tokio
- Prober scripté (succès/échecs/latence par hôte) sans réseau
- Resolver statique
- Harness pilotant le scheduler round par round
*/

pub mod probe_stub;
pub mod store_stub;
pub mod test_utils;

pub use probe_stub::{ScriptedProber, StaticResolver};
pub use store_stub::MemoryStore;
pub use test_utils::TestHarness;
