use criterion::*;
use ndarray::Array2;
use thermal_roi::{
    geometry::rasterize, AnatomicalTemplate, MultiPointAnalyzer, RegionGeometry,
    TemperatureField,
};

pub struct Samples<T>(Vec<T>);
impl<T> Samples<T> {
    pub fn sampler<'a>(&'a self) -> impl FnMut() -> &'a T {
        let mut curr = 0;
        move || {
            let ret = curr;
            curr += 1;
            curr %= self.0.len();
            &self.0[ret]
        }
    }
    pub fn from_fn<F: FnMut() -> T>(size: usize, mut proc: F) -> Self {
        Self((0..size).map(|_| proc()).collect())
    }
}

fn field(seed: usize) -> TemperatureField {
    TemperatureField::from_array(Array2::from_shape_fn((480, 640), |(y, x)| {
        28. + ((x * 7 + y * 13 + seed * 31) % 97) as f64 * 0.07
    }))
}

/// The 18 tender points, drawn on a 6x3 grid with mixed shapes.
fn drawn_template() -> AnatomicalTemplate {
    let mut template = AnatomicalTemplate::fibromyalgia_18_points();
    let names: Vec<String> = template.roi_names().map(String::from).collect();
    for (i, name) in names.iter().enumerate() {
        let (x, y) = (50 + (i as i32 % 6) * 100, 80 + (i as i32 / 6) * 150);
        let geometry = match i % 3 {
            0 => RegionGeometry::ellipse((x, y), 40, 30),
            1 => RegionGeometry::rectangle((x - 35, y - 35), (x + 35, y + 35)),
            _ => RegionGeometry::polygon(vec![(x, y - 40), (x + 40, y + 30), (x - 40, y + 30)]),
        };
        template.set_geometry(name, geometry).expect("ROI exists");
    }
    template
}

fn rasterization(c: &mut Criterion) {
    let shapes = [
        ("rectangle", RegionGeometry::rectangle((100, 100), (300, 250))),
        ("ellipse", RegionGeometry::ellipse((320, 240), 120, 80)),
        (
            "polygon",
            RegionGeometry::polygon(vec![(100, 50), (500, 120), (420, 400), (260, 300), (120, 420)]),
        ),
    ];
    for (name, geometry) in shapes.iter() {
        c.bench_function(&format!("rasterize_{}", name), |b| {
            b.iter(|| rasterize(black_box(geometry), 640, 480).unwrap())
        });
    }
}

fn analysis(c: &mut Criterion) {
    let template = drawn_template();
    let fields = Samples::from_fn(4, {
        let mut seed = 0;
        move || {
            seed += 1;
            field(seed)
        }
    });

    let mut group = c.benchmark_group("analyze_640x480");
    for &parallel in [false, true].iter() {
        let analyzer = MultiPointAnalyzer::default().with_parallel(parallel);
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            let mut sample = fields.sampler();
            b.iter(|| analyzer.analyze(&template, sample(), "bench").unwrap())
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = rasterization, analysis
}

criterion_main!(benches);
