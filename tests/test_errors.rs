use std::sync::Arc;

use pretty_assertions::assert_eq;

use slabplan::{
    CancelToken, Error, File, MemStore, OpenMode, PlanConfig, RawSlice, Result, Selection,
    StrategyKind,
};

#[macro_use]
mod common;

use self::common::util::{new_mem_file, CancellingStore, ConcurrencyStore, FaultyStore};

#[test]
fn test_validation_happens_before_io() -> Result<()> {
    let (store, file) = new_mem_file();
    let ds = file.new_dataset::<u8>().shape((5, 6)).chunk((2, 2)).create("a")?;
    store.reset_stats();

    let err = ds.read_selection(vec![vec![0usize, 5], vec![1]], (2, 1)).unwrap_err();
    assert!(matches!(err, Error::OutOfRange(_)));
    assert_eq!(err.to_string(), "out of range: index 5 out of bounds for axis 0 with size 5");

    assert_err!(ds.write_selection(vec![RawSlice::new(0, 2, 3, 2), RawSlice::contiguous(0, 1)], &[0; 6]), "invalid selection");
    assert_err!(ds.read_selection(vec![RawSlice::new(4, 1, 1, 2), RawSlice::contiguous(0, 1)], (2, 1)), "out of range");
    assert_err!(ds.read_selection(vec![vec![0usize]], 1), "selection ndim (1) != shape ndim (2)");
    assert_err!(ds.write_selection(vec![vec![0usize, 0], vec![1]], &[0; 2]), "duplicate index 0 for axis 0");
    assert_err!(ds.write_selection(.., &[0; 29]), "buffer holds 29 bytes");
    assert_err!(ds.read_raw::<i8>(), "element type mismatch");
    assert_eq!(store.stats().calls, 0);
    Ok(())
}

#[test]
fn test_object_errors() -> Result<()> {
    let (_, file) = new_mem_file();
    file.new_dataset::<u8>().shape(3).create("a")?;
    assert!(matches!(file.dataset("b").unwrap_err(), Error::NotFound(_)));
    assert!(matches!(file.new_dataset::<u8>().shape(3).create("a").unwrap_err(), Error::AlreadyExists(_)));
    assert!(matches!(file.new_dataset::<u8>().shape(()).create("c").unwrap_err(), Error::InvalidParams(_)));
    assert!(matches!(file.new_dataset::<u8>().shape((2, 2)).chunk(2).create("c").unwrap_err(), Error::InvalidParams(_)));
    let other = File::in_memory();
    other.new_dataset::<u8>().shape(1).create("a")?;
    assert!(matches!(other.copy_from(&file, "a", "a").unwrap_err(), Error::NameConflict(_)));
    Ok(())
}

#[test]
fn test_read_only_store() -> Result<()> {
    let store = Arc::new(MemStore::new());
    let file = File::from_store(store.clone());
    let ds = file.new_dataset::<u16>().shape((4, 4)).chunk((2, 2)).create("a")?;
    ds.write_raw(&(0..16).collect::<Vec<u16>>())?;

    let ro = File::new(store.reopen(OpenMode::ReadOnly));
    let ds = ro.dataset("a")?;
    assert_eq!(ds.read_raw::<u16>()?, (0..16).collect::<Vec<u16>>());
    let err = ds.write_selection(vec![vec![1usize], vec![1, 3]], &[0; 4]).unwrap_err();
    assert!(matches!(err, Error::ReadOnly(_)));
    assert!(err.context().is_none());
    assert!(matches!(ro.new_dataset::<u8>().shape(1).create("b").unwrap_err(), Error::ReadOnly(_)));
    Ok(())
}

#[test]
fn test_io_error_reports_step() -> Result<()> {
    let store = Arc::new(FaultyStore::new(MemStore::new(), 5));
    let file = File::from_store(store.clone());
    let ds = file.new_dataset::<u8>().shape((8, 6)).chunk((4, 3)).create("a")?;

    let config = PlanConfig::build().strategy(StrategyKind::PerChunk).parallel(false).finish()?;
    let err = ds.as_reader().config(config).read_selection(.., (8, 6)).unwrap_err();
    assert_eq!(err.to_string(), "i/o error at plan step 2 (chunk (1, 0)): injected fault at row 5");
    assert_eq!(store.faults(), 1);
    // steps after the failure are not issued
    assert_eq!(store.inner().stats().calls, 2);

    let config = PlanConfig::build().strategy(StrategyKind::PerChunk).finish()?;
    let err = ds.as_writer().config(config).write_selection(.., &[1; 48]).unwrap_err();
    assert!(err.is_io());
    let ctx = err.context().cloned().ok_or("missing step context")?;
    assert!(ctx.step >= 2);
    assert_eq!(ctx.chunk.map(|c| c[0]), Some(1));
    Ok(())
}

#[test]
fn test_handles_closed_after_errors() -> Result<()> {
    let store = Arc::new(FaultyStore::new(MemStore::new(), 0));
    let file = File::from_store(store.clone());
    {
        let ds = file.new_dataset::<u8>().shape((2, 2)).create("a")?;
        assert!(ds.read_raw::<u8>().is_err());
        assert_eq!(store.inner().open_handles(), 1);
    }
    assert_eq!(store.inner().open_handles(), 0);
    Ok(())
}

#[test]
fn test_cancelled_before_first_step() -> Result<()> {
    let (store, file) = new_mem_file();
    let ds = file.new_dataset::<u8>().shape((6, 6)).chunk((2, 2)).create("a")?;
    let token = CancelToken::new();
    let config = PlanConfig::build().cancel_token(&token).finish()?;
    let sel = Selection::from_indices(vec![vec![0usize, 3, 5], vec![1, 4]]);
    assert!(ds.as_reader().config(config.clone()).read_selection(&sel, (3, 2)).is_ok());

    token.cancel();
    store.reset_stats();
    let err = ds.as_reader().config(config.clone()).read_selection(&sel, (3, 2)).unwrap_err();
    assert_eq!(err, Error::Cancelled);
    let err = ds.as_writer().config(config).write_selection(&sel, &[0; 6]).unwrap_err();
    assert_eq!(err, Error::Cancelled);
    assert_eq!(store.stats().calls, 0);
    Ok(())
}

#[test]
fn test_cancelled_between_steps() -> Result<()> {
    let sel = Selection::from_indices(vec![vec![0usize, 3, 5], vec![1, 2, 4]]);
    for &nth in &[1usize, 2, 4] {
        let token = CancelToken::new();
        let store = Arc::new(CancellingStore::new(MemStore::new(), &token, nth));
        let file = File::from_store(store.clone());
        let ds = file.new_dataset::<u8>().shape((6, 6)).chunk((2, 2)).create("a")?;
        let config = PlanConfig::build()
            .strategy(StrategyKind::PerChunk)
            .parallel(false)
            .cancel_token(&token)
            .finish()?;
        let reader = ds.as_reader().config(config);
        assert_eq!(reader.plan(&sel)?.len(), 9);
        let err = reader.read_selection(&sel, (3, 3)).unwrap_err();
        assert_eq!(err, Error::Cancelled);
        assert_eq!(store.calls(), nth);
        assert_eq!(store.inner().stats().calls, nth);
    }

    let token = CancelToken::new();
    let store = Arc::new(CancellingStore::new(MemStore::new(), &token, 2));
    let file = File::from_store(store.clone());
    let ds = file.new_dataset::<u8>().shape((6, 6)).chunk((2, 2)).create("a")?;
    let config = PlanConfig::build()
        .strategy(StrategyKind::PerChunk)
        .parallel(false)
        .cancel_token(&token)
        .finish()?;
    let err = ds.as_writer().config(config).write_selection(&sel, &[7; 9]).unwrap_err();
    assert_eq!(err, Error::Cancelled);
    assert_eq!(store.calls(), 2);
    // the two issued steps landed, the rest did not
    assert_eq!(ds.read_raw::<u8>()?.iter().filter(|&&x| x == 7).count(), 2);
    Ok(())
}

#[test]
fn test_engine_calls_serialized() -> Result<()> {
    let data: Vec<u32> = (0..256).collect();
    let config = PlanConfig::build().strategy(StrategyKind::PerChunk).threads(4).finish()?;

    let store = Arc::new(ConcurrencyStore::new(MemStore::new().not_threadsafe()));
    let file = File::from_store(store.clone());
    let ds = file.new_dataset::<u32>().shape((16, 16)).chunk((4, 4)).create("a")?;
    ds.as_writer().config(config.clone()).write_raw(&data)?;
    assert_eq!(ds.as_reader().config(config.clone()).read_raw::<u32>()?, data);
    assert_eq!(store.inner().stats().chunk_writes, 16);
    assert_eq!(store.max_in_flight(), 1);

    // the same plan overlaps engine calls when the engine allows it
    let store = Arc::new(ConcurrencyStore::new(MemStore::new()));
    let file = File::from_store(store.clone());
    let ds = file.new_dataset::<u32>().shape((16, 16)).chunk((4, 4)).create("a")?;
    ds.as_writer().config(config.clone()).write_raw(&data)?;
    assert_eq!(ds.as_reader().config(config).read_raw::<u32>()?, data);
    assert!(store.max_in_flight() > 1);
    Ok(())
}
