/// Locks a `Mutex`. A poisoned lock means a panic while holding it, which is a bug.
///
/// ```rust, ignore
///  let mut announced = lock!(state.announced);
///  announced.push(full_name);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().expect("Failed to acquire lock")
    };
}

/// Read-locks an `RwLock`.
///
/// ```rust, ignore
///  let handler = read_lock!(self.fallback).clone();
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock.read().expect("Failed to acquire read lock")
    };
}

/// Write-locks an `RwLock`.
///
/// ```rust, ignore
///  write_lock!(self.images).insert(name, image);
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock.write().expect("Failed to acquire write lock")
    };
}
