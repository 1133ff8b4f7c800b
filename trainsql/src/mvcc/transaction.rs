use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use byteorder::{BigEndian, ReadBytesExt};
use crate::error::{CResult, Error};
use crate::mvcc::key::{Key, KeyPrefix};
use crate::mvcc::Version;
use crate::storage::engine::Engine;

/// The snapshot a transaction was opened with: its own version and the set
/// of versions that were still in-flight at begin-time. Writes from the
/// active set are never visible to this transaction, even after they
/// commit.
#[derive(Clone, Debug, Default)]
pub struct TransactionState {
    pub version: Version,
    pub active: HashSet<Version>,
}

impl TransactionState {
    fn is_visible(&self, version: Version) -> bool {
        version <= self.version && !self.active.contains(&version)
    }
}

/// A single MVCC transaction over a shared, lock-protected storage engine.
pub struct Transaction<E: Engine> {
    engine: Arc<Mutex<E>>,
    state: TransactionState,
}

fn lock<E: Engine>(engine: &Arc<Mutex<E>>) -> CResult<std::sync::MutexGuard<'_, E>> {
    engine.lock().map_err(|_| Error::Internal("storage engine lock poisoned".into()))
}

impl<E: Engine> Transaction<E> {
    /// Begins a new read-write transaction: allocates the next version,
    /// snapshots the currently in-flight versions, and marks itself active.
    pub fn begin(engine: Arc<Mutex<E>>) -> CResult<Self> {
        let mut eng = lock(&engine)?;

        let version = match eng.get(&Key::NextVersion.encode())? {
            Some(raw) => Cursor::new(raw).read_u64::<BigEndian>()?,
            None => 1,
        };
        eng.set(&Key::NextVersion.encode(), (version + 1).to_be_bytes().to_vec())?;

        let active = eng
            .scan_prefix(&KeyPrefix::TxnActive.encode())
            .map(|entry| entry.and_then(|(key, _)| Key::decode_txn_active(&key)))
            .collect::<CResult<HashSet<Version>>>()?;

        eng.set(&Key::TxnActive(version).encode(), vec![])?;
        drop(eng);

        log::debug!("began transaction v{} (active: {:?})", version, active);
        Ok(Self { engine, state: TransactionState { version, active } })
    }

    /// Resumes a previously-begun transaction from its saved state, e.g.
    /// across a session boundary.
    pub fn resume(engine: Arc<Mutex<E>>, state: TransactionState) -> Self {
        Self { engine, state }
    }

    pub fn version(&self) -> Version {
        self.state.version
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    fn is_visible(&self, version: Version) -> bool {
        self.state.is_visible(version)
    }

    /// Commits the transaction: the write log is discarded and the active
    /// marker removed. Versioned data records persist.
    pub fn commit(self) -> CResult<()> {
        let mut eng = lock(&self.engine)?;
        let prefix = KeyPrefix::TxnWrite(self.state.version).encode();
        let writes: Vec<Vec<u8>> =
            eng.scan_prefix(&prefix).map(|r| r.map(|(k, _)| k)).collect::<CResult<_>>()?;
        for key in writes {
            eng.delete(&key)?;
        }
        eng.delete(&Key::TxnActive(self.state.version).encode())?;
        log::debug!("committed transaction v{}", self.state.version);
        Ok(())
    }

    /// Rolls back the transaction: every versioned record it wrote is
    /// deleted, along with its write log and active marker.
    pub fn rollback(self) -> CResult<()> {
        let mut eng = lock(&self.engine)?;
        let prefix = KeyPrefix::TxnWrite(self.state.version).encode();
        let writes: Vec<Vec<u8>> =
            eng.scan_prefix(&prefix).map(|r| r.map(|(k, _)| k)).collect::<CResult<_>>()?;
        for txn_write_key in writes {
            let user_key = Key::decode_txn_write(&txn_write_key)?;
            eng.delete(&Key::Version(user_key, self.state.version).encode())?;
            eng.delete(&txn_write_key)?;
        }
        eng.delete(&Key::TxnActive(self.state.version).encode())?;
        log::debug!("rolled back transaction v{}", self.state.version);
        Ok(())
    }

    /// Reads the visible value for `key`, if any, scanning its versions from
    /// high to low and returning the first visible one. An empty payload is
    /// a tombstone.
    pub fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        let mut eng = lock(&self.engine)?;
        let start = Key::Version(key.to_vec(), 0).encode();
        let end = Key::Version(key.to_vec(), self.state.version + 1).encode();
        let mut iter = eng.scan(start..end);
        while let Some(entry) = iter.next_back() {
            let (raw_key, value) = entry?;
            let (_, version) = Key::decode_version(&raw_key)?;
            if self.is_visible(version) {
                return Ok(if value.is_empty() { None } else { Some(value) });
            }
        }
        Ok(None)
    }

    /// Writes `value` for `key` under this transaction's version, failing
    /// with `WriteConflict` if a non-visible version was written after the
    /// oldest version this transaction could possibly have seen.
    pub fn set(&self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.write(key, value)
    }

    /// Deletes `key` (a tombstone write, i.e. `set(key, vec![])`).
    pub fn delete(&self, key: &[u8]) -> CResult<()> {
        self.write(key, vec![])
    }

    fn write(&self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        let mut eng = lock(&self.engine)?;

        let check_lo = self.state.active.iter().min().copied().unwrap_or(self.state.version + 1);
        let start = Key::Version(key.to_vec(), check_lo).encode();
        let end = Key::Version(key.to_vec(), Version::MAX).encode();
        if let Some(entry) = eng.scan(start..end).next_back() {
            let (raw_key, _) = entry?;
            let (_, writer_version) = Key::decode_version(&raw_key)?;
            if !self.is_visible(writer_version) {
                return Err(Error::WriteConflict(format!(
                    "key was written by a concurrent transaction (v{})",
                    writer_version
                )));
            }
        }

        eng.set(&Key::TxnWrite(self.state.version, key.to_vec()).encode(), vec![])?;
        eng.set(&Key::Version(key.to_vec(), self.state.version).encode(), value)?;
        Ok(())
    }

    /// Prefix-scans `prefix`, returning each user key with its payload
    /// stripped of the MVCC prefix and version suffix, in ascending user-key
    /// order. Retains only the highest visible version per user key and
    /// drops tombstones.
    pub fn scan_prefix(&self, prefix: &[u8]) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut eng = lock(&self.engine)?;
        let full_prefix = KeyPrefix::Version(prefix.to_vec()).encode();

        let mut newest: BTreeMap<Vec<u8>, (Version, Vec<u8>)> = BTreeMap::new();
        for entry in eng.scan_prefix(&full_prefix) {
            let (raw_key, value) = entry?;
            let (user_key, version) = Key::decode_version(&raw_key)?;
            if !self.is_visible(version) {
                continue;
            }
            match newest.get(&user_key) {
                Some((existing, _)) if *existing >= version => {}
                _ => {
                    newest.insert(user_key, (version, value));
                }
            }
        }

        Ok(newest
            .into_iter()
            .filter_map(|(key, (_, value))| if value.is_empty() { None } else { Some((key, value)) })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::Memory;

    fn txn(engine: &Arc<Mutex<Memory>>) -> Transaction<Memory> {
        Transaction::begin(engine.clone()).unwrap()
    }

    #[test]
    fn begin_allocates_increasing_versions() {
        let engine = Arc::new(Mutex::new(Memory::new()));
        let t1 = txn(&engine);
        assert_eq!(t1.version(), 1);
        t1.commit().unwrap();
        let t2 = txn(&engine);
        assert_eq!(t2.version(), 2);
    }

    #[test]
    fn read_your_own_writes() {
        let engine = Arc::new(Mutex::new(Memory::new()));
        let t = txn(&engine);
        t.set(b"k", b"v1".to_vec()).unwrap();
        assert_eq!(t.get(b"k").unwrap(), Some(b"v1".to_vec()));
        t.set(b"k", b"v2".to_vec()).unwrap();
        assert_eq!(t.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn snapshot_isolation() {
        let engine = Arc::new(Mutex::new(Memory::new()));
        let t1 = txn(&engine);
        t1.set(b"k", b"v1".to_vec()).unwrap();

        let t2 = txn(&engine);
        t1.commit().unwrap();

        // t2 began while t1 was still active, so it must never observe t1's write.
        assert_eq!(t2.get(b"k").unwrap(), None);
    }

    #[test]
    fn write_conflict_detected() {
        let engine = Arc::new(Mutex::new(Memory::new()));
        let t1 = txn(&engine);
        t1.set(b"k", b"v1".to_vec()).unwrap();

        let t2 = txn(&engine);
        t1.commit().unwrap();

        match t2.set(b"k", b"v2".to_vec()) {
            Err(Error::WriteConflict(_)) => {}
            other => panic!("expected WriteConflict, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rollback_discards_writes() {
        let engine = Arc::new(Mutex::new(Memory::new()));
        let t1 = txn(&engine);
        t1.set(b"k", b"v1".to_vec()).unwrap();
        t1.rollback().unwrap();

        let t2 = txn(&engine);
        assert_eq!(t2.get(b"k").unwrap(), None);
    }

    #[test]
    fn scan_prefix_dedupes_and_skips_tombstones() {
        let engine = Arc::new(Mutex::new(Memory::new()));
        let t1 = txn(&engine);
        t1.set(b"row1", b"a".to_vec()).unwrap();
        t1.set(b"row2", b"b".to_vec()).unwrap();
        t1.commit().unwrap();

        let t2 = txn(&engine);
        t2.set(b"row1", b"a2".to_vec()).unwrap();
        t2.delete(b"row2").unwrap();
        t2.commit().unwrap();

        let t3 = txn(&engine);
        let rows = t3.scan_prefix(b"row").unwrap();
        assert_eq!(rows, vec![(b"row1".to_vec(), b"a2".to_vec())]);
    }

    #[test]
    fn delete_is_idempotent() {
        let engine = Arc::new(Mutex::new(Memory::new()));
        let t = txn(&engine);
        t.delete(b"missing").unwrap();
        assert_eq!(t.get(b"missing").unwrap(), None);
    }
}
