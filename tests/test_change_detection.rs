use approx::assert_abs_diff_eq;
use ndarray::Array2;
use sarseq::core::window_pairs;
use sarseq::{
    ArchiveBacking, CoRegistration, CollisionPolicy, DetectorParams, ExecutionStrategy,
    GeoReference, GeoTransform, ImageSeries, MemoryRaster, PixelWindow, SarError, SarResult,
    SequentialChangeDetector, SpatialExtent, StoredRaster, WindowSubsetRegistrar,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

const ROWS: usize = 9;
const COLS: usize = 9;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn georef() -> GeoReference {
    GeoReference {
        geo_transform: Some(GeoTransform::from_gdal([500000.0, 10.0, 0.0, 4200000.0, 0.0, -10.0])),
        projection: Some("EPSG:32632".to_string()),
    }
}

/// Dual-pol covariance image: diagonal intensities scaled by `scale(r, c)`
fn dual_image(scale: impl Fn(usize, usize) -> f64) -> StoredRaster {
    let k = Array2::from_shape_fn((ROWS, COLS), |(r, c)| scale(r, c));
    let a_re = k.mapv(|v| 0.2 * v);
    let a_im = k.mapv(|v| -0.1 * v);
    let xsi = k.mapv(|v| 0.5 * v);
    StoredRaster::new(vec![k, a_re, a_im, xsi]).with_georef(georef())
}

/// Deterministic texture so neighbouring pixels differ
fn texture(r: usize, c: usize) -> f64 {
    1.0 + 0.3 * ((r * 7 + c * 3) as f64).sin().abs()
}

fn series_paths(count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| PathBuf::from(format!("/series/s1_{:02}.tif", i)))
        .collect()
}

fn sequential_params(enl: f64) -> DetectorParams {
    DetectorParams {
        execution: ExecutionStrategy::Sequential,
        archive_backing: ArchiveBacking::Heap,
        ..DetectorParams::with_enl(enl)
    }
}

/// Block of rows 1..6, cols 1..6 plus the isolated pixel (7, 7) brighten tenfold
fn in_changed_region(r: usize, c: usize) -> bool {
    ((1..6).contains(&r) && (1..6).contains(&c)) || (r, c) == (7, 7)
}

/// Three images, change between the second and third one
fn store_with_change() -> (MemoryRaster, Vec<PathBuf>) {
    let store = MemoryRaster::new();
    let files = series_paths(3);
    store.insert(files[0].clone(), dual_image(texture));
    store.insert(files[1].clone(), dual_image(texture));
    store.insert(
        files[2].clone(),
        dual_image(|r, c| {
            if in_changed_region(r, c) {
                10.0 * texture(r, c)
            } else {
                texture(r, c)
            }
        }),
    );
    (store, files)
}

#[test]
fn test_identical_series_has_no_change() {
    init_logging();
    let store = MemoryRaster::new();
    let files = series_paths(3);
    for file in &files {
        store.insert(file.clone(), dual_image(texture));
    }

    let detector = SequentialChangeDetector::new(&store, sequential_params(4.4)).unwrap();
    let output = detector.run(&files, None, None, "sarseq.tif").unwrap();

    assert!(output.maps.cmap.iter().all(|&v| v == 0));
    assert!(output.maps.smap.iter().all(|&v| v == 0));
    assert!(output.maps.fmap.iter().all(|&v| v == 0));
    assert!(output.maps.bmap.iter().all(|&b| !b));
    assert_eq!(output.maps.intervals(), 2);
}

#[test]
fn test_change_detected_at_right_interval() {
    init_logging();
    let (store, files) = store_with_change();

    let detector = SequentialChangeDetector::new(&store, sequential_params(10.0)).unwrap();
    let output = detector.run(&files, None, None, "sarseq.tif").unwrap();
    let maps = &output.maps;

    for r in 0..ROWS {
        for c in 0..COLS {
            if in_changed_region(r, c) {
                assert_eq!(maps.cmap[[r, c]], 2, "cmap at ({}, {})", r, c);
                assert_eq!(maps.smap[[r, c]], 2, "smap at ({}, {})", r, c);
                assert_eq!(maps.fmap[[r, c]], 1, "fmap at ({}, {})", r, c);
                assert!(!maps.bmap[[0, r, c]]);
                assert!(maps.bmap[[1, r, c]]);
            } else {
                assert_eq!(maps.cmap[[r, c]], 0, "cmap at ({}, {})", r, c);
                assert_eq!(maps.fmap[[r, c]], 0, "fmap at ({}, {})", r, c);
                assert!((0..maps.intervals()).all(|i| !maps.bmap[[i, r, c]]));
            }
        }
    }
    assert_eq!(maps.changed_pixels(), 26);
}

#[test]
fn test_outputs_written_with_reference_georeference() {
    init_logging();
    let (store, files) = store_with_change();

    let detector = SequentialChangeDetector::new(&store, sequential_params(10.0)).unwrap();
    let output = detector.run(&files, None, None, "/elsewhere/sarseq.tif").unwrap();

    // Outputs land next to the first input whatever directory the name carries
    assert_eq!(output.paths.cmap, PathBuf::from("/series/sarseq_cmap.tif"));
    assert_eq!(output.paths.smap, PathBuf::from("/series/sarseq_smap.tif"));
    assert_eq!(output.paths.fmap, PathBuf::from("/series/sarseq_fmap.tif"));
    assert_eq!(output.paths.bmap, PathBuf::from("/series/sarseq_bmap.tif"));

    let cmap = store.get(&output.paths.cmap).unwrap();
    assert_eq!(cmap.bands.len(), 1);
    assert_eq!(cmap.georef, georef());
    assert_eq!(cmap.bands[0][[3, 3]], 2.0);

    let bmap = store.get(&output.paths.bmap).unwrap();
    assert_eq!(bmap.bands.len(), 2);
    assert_eq!(bmap.bands[1][[3, 3]], 255.0);
    assert_eq!(bmap.bands[0][[3, 3]], 0.0);
}

#[test]
fn test_existing_outputs_with_fail_policy() {
    init_logging();
    let (store, files) = store_with_change();
    store.insert("/series/sarseq_smap.tif", StoredRaster::new(vec![Array2::zeros((1, 1))]));

    let params = DetectorParams {
        collision_policy: CollisionPolicy::Fail,
        ..sequential_params(10.0)
    };
    let detector = SequentialChangeDetector::new(&store, params).unwrap();
    let err = detector.run(&files, None, None, "sarseq.tif").unwrap_err();

    assert!(matches!(err, SarError::OutputExists(ref path) if path == Path::new("/series/sarseq_smap.tif")));
    assert!(store.get(Path::new("/series/sarseq_cmap.tif")).is_none());
}

#[test]
fn test_parallel_and_sequential_archives_agree() {
    init_logging();
    let store = MemoryRaster::new();
    let files = series_paths(5);
    for (i, file) in files.iter().enumerate() {
        let gain = 1.0 + i as f64 * 0.4;
        store.insert(
            file.clone(),
            dual_image(move |r, c| if r < 4 { gain * texture(r, c) } else { texture(r, c) }),
        );
    }
    let series = ImageSeries::load(&store, files.as_slice()).unwrap();

    let sequential = SequentialChangeDetector::new(&store, sequential_params(4.0)).unwrap();
    let parallel = SequentialChangeDetector::new(
        &store,
        DetectorParams {
            execution: ExecutionStrategy::Parallel { threads: Some(3) },
            archive_backing: ArchiveBacking::MemoryMapped,
            ..DetectorParams::with_enl(4.0)
        },
    )
    .unwrap();

    let expected = sequential.compute_archive(&series).unwrap();
    let actual = parallel.compute_archive(&series).unwrap();
    assert!(expected.is_complete());
    assert!(actual.is_complete());

    for (ell, j) in window_pairs(series.len()) {
        let lhs = expected.load(ell, j).unwrap();
        let rhs = actual.load(ell, j).unwrap();
        for (a, b) in lhs.iter().zip(rhs.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    assert_eq!(
        sequential.detect(&series).unwrap(),
        parallel.detect(&series).unwrap()
    );
}

#[test]
fn test_missing_image_is_input_error() {
    init_logging();
    let (store, mut files) = store_with_change();
    files.push(PathBuf::from("/series/missing.tif"));

    let detector = SequentialChangeDetector::new(&store, sequential_params(10.0)).unwrap();
    let err = detector.run(&files, None, None, "sarseq.tif").unwrap_err();
    assert!(matches!(err, SarError::InputRead { ref path, .. } if path == Path::new("/series/missing.tif")));

    // Nothing is written
    assert!(store.get(Path::new("/series/sarseq_cmap.tif")).is_none());
}

#[test]
fn test_single_image_is_usage_error() {
    init_logging();
    let (store, files) = store_with_change();
    let detector = SequentialChangeDetector::new(&store, sequential_params(10.0)).unwrap();
    assert!(matches!(
        detector.run(&files[..1], None, None, "sarseq.tif"),
        Err(SarError::Usage(_))
    ));
}

#[test]
fn test_mismatched_layouts_rejected() {
    init_logging();
    let (store, files) = store_with_change();
    store.insert(
        files[1].clone(),
        StoredRaster::new(vec![Array2::from_elem((ROWS, COLS), 1.0); 3]),
    );
    let detector = SequentialChangeDetector::new(&store, sequential_params(10.0)).unwrap();
    assert!(matches!(
        detector.run(&files, None, None, "sarseq.tif"),
        Err(SarError::InvalidFormat(_))
    ));
}

#[test]
fn test_median_filter_removes_isolated_change() {
    init_logging();
    let (store, files) = store_with_change();

    let params = DetectorParams {
        median_filter: true,
        ..sequential_params(10.0)
    };
    let detector = SequentialChangeDetector::new(&store, params).unwrap();
    let output = detector.run(&files, None, None, "sarseq.tif").unwrap();

    assert_eq!(output.maps.cmap[[7, 7]], 0);
    assert_eq!(output.maps.cmap[[3, 3]], 2);
    assert_eq!(output.maps.cmap[[2, 2]], 2);
    assert!(output.maps.changed_pixels() < 26);
}

#[test]
fn test_run_with_window_subsets_series() {
    init_logging();
    let (store, files) = store_with_change();
    let window: PixelWindow = "3,2,6,5".parse().unwrap();

    let detector = SequentialChangeDetector::new(&store, sequential_params(10.0)).unwrap();
    let output = detector.run(&files, Some(window), None, "sarseq.tif").unwrap();

    assert_eq!(output.series.extent(), SpatialExtent::new(6, 5));
    assert_eq!(output.series.files()[2], PathBuf::from("/series/s1_02_sub.tif"));

    // Window pixel (r, c) is image pixel (r + 2, c + 3)
    assert_eq!(output.maps.cmap.dim(), (5, 6));
    assert_eq!(output.maps.cmap[[0, 0]], 2);
    assert_eq!(output.maps.cmap[[0, 2]], 2);
    assert_eq!(output.maps.cmap[[0, 3]], 0);
    assert_eq!(output.maps.cmap[[4, 5]], 0);

    let cmap = store.get(&output.paths.cmap).unwrap();
    let gt = cmap.georef.geo_transform.unwrap();
    assert_eq!((gt.top_left_x, gt.top_left_y), (500030.0, 4199980.0));
}

struct CountingRegistrar<'a> {
    inner: WindowSubsetRegistrar<'a>,
    registered: AtomicUsize,
}

impl CoRegistration for CountingRegistrar<'_> {
    fn subset(&self, file: &Path, window: PixelWindow) -> SarResult<PathBuf> {
        self.inner.subset(file, window)
    }

    fn register(&self, reference: &Path, target: &Path, window: PixelWindow) -> SarResult<PathBuf> {
        self.registered.fetch_add(1, Ordering::SeqCst);
        self.inner.register(reference, target, window)
    }
}

#[test]
fn test_custom_registrar_used_for_every_target() {
    init_logging();
    let (store, files) = store_with_change();
    let registrar = CountingRegistrar {
        inner: WindowSubsetRegistrar::new(&store),
        registered: AtomicUsize::new(0),
    };

    let params = DetectorParams {
        execution: ExecutionStrategy::Parallel { threads: Some(2) },
        ..sequential_params(10.0)
    };
    let detector = SequentialChangeDetector::new(&store, params).unwrap();
    let window = PixelWindow { x0: 0, y0: 0, cols: 9, rows: 9 };
    let output = detector.run(&files, Some(window), Some(&registrar as &dyn CoRegistration), "sarseq.tif").unwrap();

    assert_eq!(registrar.registered.load(Ordering::SeqCst), 2);
    assert_eq!(output.maps.changed_pixels(), 26);
}

#[test]
fn test_window_outside_reference_fails() {
    init_logging();
    let (store, files) = store_with_change();
    let detector = SequentialChangeDetector::new(&store, sequential_params(10.0)).unwrap();
    let window = PixelWindow { x0: 5, y0: 5, cols: 8, rows: 8 };
    assert!(matches!(
        detector.run(&files, Some(window), None, "sarseq.tif"),
        Err(SarError::CoRegistration(_))
    ));
}
