#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the storage lifecycle: PIN handling, protected
//! values, tamper detection, wipe code and schema upgrades.

use std::cell::Cell;
use std::rc::Rc;

use pinstore::key::{EDEK_PVC_KEY, PIN_LOGS_KEY, STORAGE_UPGRADED_KEY, WIPE_CODE_DATA_KEY};
use pinstore::{
    Delay, Ledger, LedgerError, MemoryLedger, Pin, Storage, StorageConfig, StorageError, StorageKey,
    WaitControl, LEDGER_VERSION, MAX_PROTECTED_LEN,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const HW_SALT: &[u8] = b"device-unique salt";

struct NoDelay;

impl Delay for NoDelay {
    fn delay_ms(&mut self, _ms: u32) {}
}

fn test_config() -> StorageConfig {
    StorageConfig {
        pin_iter_count: 20,
        ..StorageConfig::default()
    }
}

fn open(ledger: MemoryLedger) -> Storage<MemoryLedger> {
    let mut s = Storage::with_delay(ledger, test_config(), Box::new(NoDelay)).unwrap();
    s.init(None, HW_SALT).unwrap();
    s
}

fn fresh() -> Storage<MemoryLedger> {
    open(MemoryLedger::new())
}

fn pin(digits: &str) -> Pin {
    Pin::from_digits(digits).unwrap()
}

/// Fresh storage with `digits` as PIN, unlocked.
fn with_pin(digits: &str) -> Storage<MemoryLedger> {
    let mut s = fresh();
    s.unlock(Some(&Pin::empty()), None).unwrap();
    s.change_pin(Some(&Pin::empty()), Some(&pin(digits)), None, None)
        .unwrap();
    s
}

const SEED_KEY: StorageKey = StorageKey::new(0x01, 0x01);
const OTHER_KEY: StorageKey = StorageKey::new(0x01, 0x02);
const PUBLIC_KEY: StorageKey = StorageKey::new(0x81, 0x01);
const LOCKED_WRITABLE_KEY: StorageKey = StorageKey::new(0xC1, 0x01);

// ---------------------------------------------------------------------------
// PIN lifecycle
// ---------------------------------------------------------------------------

#[test]
fn seed_survives_wrong_pins_and_relock() {
    let seed = [0x5Au8; 32];
    let mut s = with_pin("1234");
    s.set(SEED_KEY, &seed).unwrap();
    s.lock();

    assert!(matches!(s.get(SEED_KEY, 32), Err(StorageError::Locked)));
    assert_eq!(s.get_pin_rem().unwrap(), 16);

    for _ in 0..3 {
        assert!(matches!(
            s.unlock(Some(&pin("0000")), None),
            Err(StorageError::WrongPin)
        ));
    }
    assert_eq!(s.get_pin_rem().unwrap(), 13);

    s.unlock(Some(&pin("1234")), None).unwrap();
    assert_eq!(s.get_pin_rem().unwrap(), 16);
    assert_eq!(s.get(SEED_KEY, 32).unwrap().unwrap().expose(), &seed);
}

#[test]
fn pin_survives_reinit() {
    let mut s = with_pin("42");
    s.set(SEED_KEY, b"persisted").unwrap();

    let mut s = open(s.into_ledger());
    assert!(s.has_pin().unwrap());
    assert!(!s.is_unlocked());
    s.unlock(Some(&pin("42")), None).unwrap();
    assert_eq!(s.get(SEED_KEY, 64).unwrap().unwrap().expose(), b"persisted");
}

#[test]
fn hardware_salt_binds_the_envelope() {
    let s = with_pin("42");
    let mut other =
        Storage::with_delay(s.into_ledger(), test_config(), Box::new(NoDelay)).unwrap();
    other.init(None, b"another device").unwrap();
    assert!(matches!(
        other.unlock(Some(&pin("42")), None),
        Err(StorageError::WrongPin)
    ));
}

#[test]
fn last_wrong_pin_wipes_storage() {
    let mut s = with_pin("1234");
    s.set(SEED_KEY, b"seed").unwrap();
    s.lock();

    for attempt in 1..16 {
        assert!(
            matches!(s.unlock(Some(&pin("9")), None), Err(StorageError::WrongPin)),
            "attempt {attempt}"
        );
    }
    assert_eq!(s.get_pin_rem().unwrap(), 1);

    let err = s.unlock(Some(&pin("9")), None).unwrap_err();
    assert!(matches!(err, StorageError::TooManyFails));
    assert!(err.is_fatal());
    assert!(matches!(s.get_pin_rem(), Err(StorageError::Halted)));

    s.init(None, HW_SALT).unwrap();
    assert!(!s.has_pin().unwrap());
    assert_eq!(s.get_pin_rem().unwrap(), 16);
    s.unlock(Some(&Pin::empty()), None).unwrap();
    assert!(s.get(SEED_KEY, 64).unwrap().is_none());
}

#[test]
fn external_failures_count() {
    let mut s = with_pin("1234");
    s.lock();
    s.pin_fails_increase().unwrap();
    s.pin_fails_increase().unwrap();
    assert_eq!(s.get_pin_rem().unwrap(), 14);
    s.unlock(Some(&pin("1234")), None).unwrap();
    assert_eq!(s.get_pin_rem().unwrap(), 16);
}

#[test]
fn change_pin_with_wrong_old_pin_fails() {
    let mut s = with_pin("1234");
    s.lock();
    assert!(matches!(
        s.change_pin(Some(&pin("1111")), Some(&pin("2222")), None, None),
        Err(StorageError::WrongPin)
    ));
    s.unlock(Some(&pin("1234")), None).unwrap();
}

#[test]
fn removing_the_pin() {
    let mut s = with_pin("1234");
    s.change_pin(Some(&pin("1234")), Some(&Pin::empty()), None, None)
        .unwrap();
    assert!(!s.has_pin().unwrap());
    s.lock();
    s.unlock(Some(&Pin::empty()), None).unwrap();
}

#[test]
fn wipe_erases_values_and_pin() {
    let mut s = with_pin("1234");
    s.set(SEED_KEY, b"seed").unwrap();
    s.set(PUBLIC_KEY, b"label").unwrap();
    s.wipe().unwrap();

    assert!(!s.has_pin().unwrap());
    s.lock();
    s.unlock(Some(&Pin::empty()), None).unwrap();
    assert!(s.get(SEED_KEY, 64).unwrap().is_none());
    assert!(s.get(PUBLIC_KEY, 64).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Progress and cancellation
// ---------------------------------------------------------------------------

#[test]
fn cancelled_throttle_does_not_count() {
    let mut s = with_pin("1234");
    s.lock();
    assert!(matches!(
        s.unlock(Some(&pin("1")), None),
        Err(StorageError::WrongPin)
    ));

    let calls = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&calls);
    s.init(
        Some(Box::new(move |_: u32, _: u32, _: &str| {
            seen.set(seen.get() + 1);
            WaitControl::Cancel
        })),
        HW_SALT,
    )
    .unwrap();

    assert!(matches!(
        s.unlock(Some(&pin("1234")), None),
        Err(StorageError::Cancelled)
    ));
    assert_eq!(calls.get(), 1);
    assert_eq!(s.get_pin_rem().unwrap(), 15);
}

#[test]
fn throttle_reports_remaining_seconds() {
    let mut s = with_pin("1234");
    s.lock();
    for _ in 0..2 {
        let _ = s.unlock(Some(&pin("1")), None);
    }

    let waits = Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = Rc::clone(&waits);
    s.init(
        Some(Box::new(move |wait: u32, _: u32, msg: &str| {
            sink.borrow_mut().push((wait, msg.to_owned()));
            WaitControl::Continue
        })),
        HW_SALT,
    )
    .unwrap();
    s.unlock(Some(&pin("1234")), None).unwrap();

    let waits = waits.borrow();
    // Three seconds of throttle plus one derivation second.
    assert_eq!(waits.first().unwrap().0, 4);
    assert!(waits.windows(2).all(|w| w[0].0 >= w[1].0));
    assert!(waits.iter().all(|(_, msg)| msg == "Verifying PIN"));
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[test]
fn protected_values_are_encrypted_at_rest() {
    let mut s = fresh();
    s.unlock(Some(&Pin::empty()), None).unwrap();
    s.set(SEED_KEY, b"attack at dawn").unwrap();

    let raw = s.ledger().get(SEED_KEY.raw()).unwrap();
    assert_eq!(raw.len(), 12 + 16 + 14);
    assert!(!raw.windows(14).any(|w| w == b"attack at dawn"));
}

#[test]
fn overwrite_and_delete() {
    let mut s = fresh();
    s.unlock(Some(&Pin::empty()), None).unwrap();
    s.set(SEED_KEY, b"first").unwrap();
    s.set(SEED_KEY, b"second value").unwrap();
    s.set(OTHER_KEY, b"other").unwrap();
    assert_eq!(s.get(SEED_KEY, 64).unwrap().unwrap().expose(), b"second value");

    assert!(s.delete(SEED_KEY).unwrap());
    assert!(!s.delete(SEED_KEY).unwrap());
    assert!(!s.has(SEED_KEY).unwrap());
    assert_eq!(s.get(OTHER_KEY, 64).unwrap().unwrap().expose(), b"other");
}

#[test]
fn protected_read_checks_max_len() {
    let mut s = fresh();
    s.unlock(Some(&Pin::empty()), None).unwrap();
    s.set(SEED_KEY, &[1u8; 33]).unwrap();
    assert!(matches!(
        s.get(SEED_KEY, 32),
        Err(StorageError::BufferTooSmall { len: 33 })
    ));
    assert!(s.is_unlocked());
}

#[test]
fn oversized_values_are_rejected() {
    let mut s = fresh();
    s.unlock(Some(&Pin::empty()), None).unwrap();
    let too_long = vec![0u8; MAX_PROTECTED_LEN + 1];
    assert!(matches!(
        s.set(SEED_KEY, &too_long),
        Err(StorageError::ValueTooLong { .. })
    ));
    assert!(!s.has(SEED_KEY).unwrap());

    let largest = vec![7u8; MAX_PROTECTED_LEN];
    s.set(SEED_KEY, &largest).unwrap();
    let back = s.get(SEED_KEY, MAX_PROTECTED_LEN).unwrap().unwrap();
    assert_eq!(back.len(), MAX_PROTECTED_LEN);
    assert!(back.expose().iter().all(|&b| b == 7));
}

#[test]
fn public_keys_while_locked() {
    let mut s = fresh();
    s.unlock(Some(&Pin::empty()), None).unwrap();
    s.set(PUBLIC_KEY, b"label").unwrap();
    s.lock();

    assert_eq!(s.get(PUBLIC_KEY, 16).unwrap().unwrap().expose(), b"label");
    assert!(matches!(s.set(PUBLIC_KEY, b"x"), Err(StorageError::Locked)));
    assert!(matches!(s.delete(PUBLIC_KEY), Err(StorageError::Locked)));

    s.set(LOCKED_WRITABLE_KEY, b"flag").unwrap();
    assert_eq!(
        s.get(LOCKED_WRITABLE_KEY, 16).unwrap().unwrap().expose(),
        b"flag"
    );
    assert!(s.delete(LOCKED_WRITABLE_KEY).unwrap());
}

#[test]
fn counters_run_past_their_tail() {
    let mut s = fresh();
    for expected in 0..100 {
        assert_eq!(s.next_counter(LOCKED_WRITABLE_KEY).unwrap(), expected);
    }
    s.set_counter(LOCKED_WRITABLE_KEY, 1_000).unwrap();
    assert_eq!(s.next_counter(LOCKED_WRITABLE_KEY).unwrap(), 1_001);

    let mut s = open(s.into_ledger());
    assert_eq!(s.next_counter(LOCKED_WRITABLE_KEY).unwrap(), 1_002);
}

#[test]
fn counter_near_u32_max_overflows_cleanly() {
    let mut s = fresh();
    s.set_counter(LOCKED_WRITABLE_KEY, u32::MAX - 1).unwrap();
    assert_eq!(s.next_counter(LOCKED_WRITABLE_KEY).unwrap(), u32::MAX);
    assert!(s.next_counter(LOCKED_WRITABLE_KEY).is_err());
}

// ---------------------------------------------------------------------------
// Tamper detection
// ---------------------------------------------------------------------------

fn tampered_fixture() -> Storage<MemoryLedger> {
    let mut s = fresh();
    s.unlock(Some(&Pin::empty()), None).unwrap();
    s.set(SEED_KEY, b"seed").unwrap();
    s.set(OTHER_KEY, b"other").unwrap();
    s
}

#[test]
fn injected_protected_entry_is_detected() {
    let mut s = tampered_fixture();
    s.ledger_mut()
        .tamper_set(StorageKey::new(0x02, 0x01).raw(), &[0u8; 40]);

    let err = s.get(SEED_KEY, 64).unwrap_err();
    assert!(matches!(err, StorageError::Fault("storage tag check")));
    assert!(err.is_fatal());
    assert!(matches!(s.get(SEED_KEY, 64), Err(StorageError::Halted)));
}

#[test]
fn renamed_entry_is_detected() {
    let mut s = tampered_fixture();
    let value = s.ledger().get(OTHER_KEY.raw()).unwrap().to_vec();
    assert!(s.ledger_mut().tamper_remove(OTHER_KEY.raw()));
    s.ledger_mut()
        .tamper_set(StorageKey::new(0x01, 0x03).raw(), &value);

    assert!(matches!(
        s.get(SEED_KEY, 64),
        Err(StorageError::Fault("storage tag check"))
    ));
}

#[test]
fn removed_entry_is_detected() {
    let mut s = tampered_fixture();
    assert!(s.ledger_mut().tamper_remove(OTHER_KEY.raw()));
    assert!(matches!(
        s.get(SEED_KEY, 64),
        Err(StorageError::Fault("storage tag check"))
    ));
}

/// The store tag authenticates which protected keys exist, not their
/// bytes. A damaged value is caught by its own AEAD tag when it is read,
/// and the other protected values stay readable after re-init.
#[test]
fn corrupted_ciphertext_faults_on_its_own_read_only() {
    let mut s = tampered_fixture();
    assert!(s.ledger_mut().tamper_xor(SEED_KEY.raw(), 30, 0x01));

    assert!(matches!(
        s.get(SEED_KEY, 64),
        Err(StorageError::Fault("authentication tag check"))
    ));

    // The fault cost one attempt.
    s.init(None, HW_SALT).unwrap();
    assert_eq!(s.get_pin_rem().unwrap(), 15);
    s.unlock(Some(&Pin::empty()), None).unwrap();
    assert_eq!(s.get(OTHER_KEY, 64).unwrap().unwrap().expose(), b"other");
}

#[test]
fn public_entries_are_not_covered_by_the_tag() {
    let mut s = tampered_fixture();
    s.ledger_mut().tamper_set(PUBLIC_KEY.raw(), b"injected");
    assert_eq!(s.get(SEED_KEY, 64).unwrap().unwrap().expose(), b"seed");
}

#[test]
fn corrupted_envelope_reads_as_wrong_pin() {
    let mut s = with_pin("1234");
    s.lock();
    assert!(s.ledger_mut().tamper_xor(EDEK_PVC_KEY.raw(), 10, 0x80));
    assert!(matches!(
        s.unlock(Some(&pin("1234")), None),
        Err(StorageError::WrongPin)
    ));
}

// ---------------------------------------------------------------------------
// Wipe code
// ---------------------------------------------------------------------------

#[test]
fn wipe_code_erases_everything() {
    let mut s = with_pin("1234");
    s.set(SEED_KEY, b"seed").unwrap();
    s.change_wipe_code(&pin("1234"), None, &pin("5678")).unwrap();
    assert!(s.has_wipe_code().unwrap());
    s.lock();

    let err = s.unlock(Some(&pin("5678")), None).unwrap_err();
    assert!(matches!(err, StorageError::WipeCodeEntered));
    assert!(err.is_fatal());

    s.init(None, HW_SALT).unwrap();
    assert!(!s.has_pin().unwrap());
    s.unlock(Some(&Pin::empty()), None).unwrap();
    assert!(!s.has_wipe_code().unwrap());
    assert!(s.get(SEED_KEY, 64).unwrap().is_none());
}

#[test]
fn pin_and_wipe_code_stay_distinct() {
    let mut s = with_pin("1234");
    assert!(matches!(
        s.change_wipe_code(&pin("1234"), None, &pin("1234")),
        Err(StorageError::BadArgument(_))
    ));
    s.change_wipe_code(&pin("1234"), None, &pin("5678")).unwrap();
    assert!(matches!(
        s.change_pin(Some(&pin("1234")), Some(&pin("5678")), None, None),
        Err(StorageError::IsWipeCode)
    ));
    s.lock();
    s.unlock(Some(&pin("1234")), None).unwrap();
}

#[test]
fn wipe_code_needs_the_pin() {
    let mut s = with_pin("1234");
    s.lock();
    assert!(matches!(
        s.change_wipe_code(&pin("4321"), None, &pin("5678")),
        Err(StorageError::WrongPin)
    ));
    s.unlock(Some(&pin("1234")), None).unwrap();
    assert!(!s.has_wipe_code().unwrap());
}

// ---------------------------------------------------------------------------
// Schema upgrades
// ---------------------------------------------------------------------------

const TRUE_WORD: u32 = 0xC35A_69A5;
const FALSE_WORD: u32 = 0x3CA5_965A;

/// A schema-0 ledger: plaintext PIN, three recorded failures, one
/// protected and one public value.
fn legacy_ledger() -> MemoryLedger {
    let encoded = pin("1234").encoded().to_le_bytes();
    let mut fails = Vec::new();
    fails.extend_from_slice(&0u32.to_le_bytes());
    fails.extend_from_slice(&0xFFFF_FFF8u32.to_le_bytes());
    MemoryLedger::from_entries(
        0,
        &[
            (0x0000, encoded.as_slice()),
            (0x0001, fails.as_slice()),
            (SEED_KEY.raw(), b"legacy seed".as_slice()),
            (PUBLIC_KEY.raw(), b"legacy label".as_slice()),
        ],
    )
}

fn upgraded_flag(s: &Storage<MemoryLedger>) -> u32 {
    let raw = s.ledger().get(STORAGE_UPGRADED_KEY.raw()).unwrap();
    u32::from_le_bytes(raw.try_into().unwrap())
}

#[test]
fn plaintext_store_is_upgraded() {
    let mut s = open(legacy_ledger());
    assert_eq!(s.ledger().version(), LEDGER_VERSION);
    assert!(s.has_pin().unwrap());
    assert_eq!(s.get_pin_rem().unwrap(), 13);
    assert_eq!(upgraded_flag(&s), TRUE_WORD);
    assert_ne!(s.ledger().get(SEED_KEY.raw()).unwrap(), b"legacy seed");
    assert!(s.ledger().get(0x0000).is_none());

    assert_eq!(
        s.get(PUBLIC_KEY, 64).unwrap().unwrap().expose(),
        b"legacy label"
    );
    s.unlock(Some(&pin("1234")), None).unwrap();
    assert_eq!(upgraded_flag(&s), FALSE_WORD);
    assert_eq!(
        s.get(SEED_KEY, 64).unwrap().unwrap().expose(),
        b"legacy seed"
    );
    assert!(!s.has_wipe_code().unwrap());

    s.lock();
    s.unlock(Some(&pin("1234")), None).unwrap();
}

#[test]
fn plaintext_store_without_pin_is_upgraded() {
    let ledger = MemoryLedger::from_entries(0, &[(SEED_KEY.raw(), b"v".as_slice())]);
    let mut s = open(ledger);
    assert!(!s.has_pin().unwrap());
    assert_eq!(s.get_pin_rem().unwrap(), 16);
    s.unlock(Some(&Pin::empty()), None).unwrap();
    assert_eq!(s.get(SEED_KEY, 8).unwrap().unwrap().expose(), b"v");
}

#[test]
fn exhausted_legacy_counter_wipes_on_upgrade() {
    let exhausted = 0xFFFF_0000u32.to_le_bytes();
    let ledger = MemoryLedger::from_entries(0, &[(0x0001, exhausted.as_slice())]);
    let mut s = Storage::with_delay(ledger, test_config(), Box::new(NoDelay)).unwrap();
    let err = s.init(None, HW_SALT).unwrap_err();
    assert!(matches!(err, StorageError::Fault("storage upgrade")));
    assert!(matches!(s.has_pin(), Err(StorageError::Halted)));

    s.init(None, HW_SALT).unwrap();
    assert!(!s.has_pin().unwrap());
    assert_eq!(s.get_pin_rem().unwrap(), 16);
}

#[test]
fn schema_one_store_gains_a_wipe_code() {
    // Upgrade from schema 0 without unlocking, then strip what schema 1
    // did not have.
    let mut ledger = open(legacy_ledger()).into_ledger();
    assert!(ledger.tamper_remove(WIPE_CODE_DATA_KEY.raw()));
    assert!(ledger.tamper_remove(STORAGE_UPGRADED_KEY.raw()));
    ledger.tamper_version(1);

    let mut s = open(ledger);
    assert_eq!(s.ledger().version(), LEDGER_VERSION);
    assert!(s.ledger().get(WIPE_CODE_DATA_KEY.raw()).is_some());
    s.unlock(Some(&pin("1234")), None).unwrap();
    assert!(!s.has_wipe_code().unwrap());
    assert_eq!(
        s.get(SEED_KEY, 64).unwrap().unwrap().expose(),
        b"legacy seed"
    );
}

#[test]
fn unrecorded_upgrade_is_a_version_error() {
    let mut s = open(legacy_ledger());
    s.ledger_mut()
        .tamper_set(STORAGE_UPGRADED_KEY.raw(), &FALSE_WORD.to_le_bytes());

    let err = s.unlock(Some(&pin("1234")), None).unwrap_err();
    assert!(matches!(err, StorageError::WrongVersion));
    assert!(err.is_fatal());

    s.init(None, HW_SALT).unwrap();
    assert!(!s.has_pin().unwrap());
}

#[test]
fn pending_upgrade_flag_on_current_store_is_a_version_error() {
    let mut s = with_pin("1234");
    s.lock();
    s.ledger_mut()
        .tamper_set(STORAGE_UPGRADED_KEY.raw(), &TRUE_WORD.to_le_bytes());
    assert!(matches!(
        s.unlock(Some(&pin("1234")), None),
        Err(StorageError::WrongVersion)
    ));
}

#[test]
fn newer_ledger_schema_wipes_on_init() {
    let mut s = with_pin("1234");
    s.set(SEED_KEY, b"seed").unwrap();
    s.lock();
    let mut ledger = s.into_ledger();
    ledger.tamper_version(LEDGER_VERSION + 1);
    ledger.tamper_set(STORAGE_UPGRADED_KEY.raw(), &TRUE_WORD.to_le_bytes());

    let mut s = Storage::with_delay(ledger, test_config(), Box::new(NoDelay)).unwrap();
    let err = s.init(None, HW_SALT).unwrap_err();
    assert!(matches!(err, StorageError::WrongVersion));
    assert!(err.is_fatal());
    assert!(matches!(s.has_pin(), Err(StorageError::Halted)));
    assert!(s.ledger().get(SEED_KEY.raw()).is_none());
    assert_eq!(s.ledger().version(), LEDGER_VERSION);

    s.init(None, HW_SALT).unwrap();
    assert!(!s.has_pin().unwrap());
    assert_eq!(s.get_pin_rem().unwrap(), 16);
    s.unlock(Some(&Pin::empty()), None).unwrap();
    assert!(s.get(SEED_KEY, 64).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Lost PIN log writes
// ---------------------------------------------------------------------------

/// Ledger whose word writes to the PIN log report success but change
/// nothing, as after a glitched flash program.
struct LossyLogLedger {
    inner: MemoryLedger,
    drop_log_writes: bool,
}

impl Ledger for LossyLogLedger {
    fn init(&mut self) -> Result<u32, LedgerError> {
        self.inner.init()
    }

    fn get(&self, key: u16) -> Option<&[u8]> {
        self.inner.get(key)
    }

    fn get_next(&self, cursor: &mut usize) -> Option<(u16, &[u8])> {
        self.inner.get_next(cursor)
    }

    fn set_ex(&mut self, key: u16, value: Option<&[u8]>, len: u16) -> Result<bool, LedgerError> {
        self.inner.set_ex(key, value, len)
    }

    fn update_bytes(&mut self, key: u16, offset: u16, data: &[u8]) -> Result<(), LedgerError> {
        if self.drop_log_writes && key == PIN_LOGS_KEY.raw() {
            return Ok(());
        }
        self.inner.update_bytes(key, offset, data)
    }

    fn delete(&mut self, key: u16) -> Result<bool, LedgerError> {
        self.inner.delete(key)
    }

    fn wipe(&mut self) -> Result<(), LedgerError> {
        self.inner.wipe()
    }

    fn upgrade_finish(&mut self) -> Result<(), LedgerError> {
        self.inner.upgrade_finish()
    }
}

fn lossy_with_seed() -> Storage<LossyLogLedger> {
    let ledger = LossyLogLedger {
        inner: MemoryLedger::new(),
        drop_log_writes: false,
    };
    let mut s = Storage::with_delay(ledger, test_config(), Box::new(NoDelay)).unwrap();
    s.init(None, HW_SALT).unwrap();
    s.unlock(Some(&Pin::empty()), None).unwrap();
    s.change_pin(Some(&Pin::empty()), Some(&pin("1234")), None, None)
        .unwrap();
    s.set(SEED_KEY, b"seed").unwrap();
    s.lock();
    s.ledger_mut().drop_log_writes = true;
    s
}

#[test]
fn lost_external_fail_increase_is_a_fault() {
    let mut s = lossy_with_seed();
    assert_eq!(s.get_pin_rem().unwrap(), 16);

    let err = s.pin_fails_increase().unwrap_err();
    assert!(matches!(err, StorageError::Fault("PIN counter increment")));
    assert!(matches!(s.get_pin_rem(), Err(StorageError::Halted)));
    // Counting the fault fails the same way, so the storage is wiped.
    assert!(s.ledger().get(SEED_KEY.raw()).is_none());

    s.ledger_mut().drop_log_writes = false;
    s.init(None, HW_SALT).unwrap();
    assert!(!s.has_pin().unwrap());
    assert_eq!(s.get_pin_rem().unwrap(), 16);
}

#[test]
fn lost_fail_increase_during_unlock_is_a_fault() {
    let mut s = lossy_with_seed();
    let err = s.unlock(Some(&pin("0000")), None).unwrap_err();
    assert!(matches!(err, StorageError::Fault("PIN counter increment")));
    assert!(!s.is_unlocked());
    assert!(s.ledger().get(SEED_KEY.raw()).is_none());
}
