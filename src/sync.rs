use lazy_static::lazy_static;
use parking_lot::ReentrantMutex;

/// Guards the execution of the provided closure with a recursive static mutex.
///
/// Storage engines that are not safe for concurrent access are only ever
/// entered through this lock, so at most one engine call is in flight.
pub fn sync<T, F>(func: F) -> T
where
    F: FnOnce() -> T,
{
    lazy_static! {
        static ref LOCK: ReentrantMutex<()> = ReentrantMutex::new(());
    }
    let _guard = LOCK.lock();
    func()
}
