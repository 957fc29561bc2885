use criterion::{
    black_box, measurement::Measurement, BenchmarkGroup, BenchmarkId, Criterion, Throughput,
};
use dicom_contour_mask::geometry::{ImagePlane, PixelIndex, PixelSpacing, Point};
use dicom_contour_mask::rasterize::{PointSpace, RasterizeConfig, Rasterizer};
use std::f64::consts::TAU;

/// Points on an ellipse centered in the plane, in millimeters.
fn ellipse(plane: &ImagePlane, num_points: usize) -> Vec<Point> {
    let center = plane.to_physical(PixelIndex::new(
        plane.rows as i64 / 2,
        plane.columns as i64 / 2,
    ));
    let radius_x = plane.columns as f64 * plane.pixel_spacing.column / 3.0;
    let radius_y = plane.rows as f64 * plane.pixel_spacing.row / 4.0;
    (0..num_points)
        .map(|i| {
            let angle = TAU * i as f64 / num_points as f64;
            Point::new(
                center.x + radius_x * angle.cos(),
                center.y + radius_y * angle.sin(),
            )
        })
        .collect()
}

struct BenchDef {
    plane: ImagePlane,
    points: Vec<Point>,
    id: &'static str,
    sample_size: usize,
}

impl BenchDef {
    fn new(id: &'static str, sample_size: usize, size: usize, num_points: usize) -> Self {
        let plane = ImagePlane::axis_aligned(
            Point::new(-100.0, -100.0),
            PixelSpacing {
                row: 0.5,
                column: 0.5,
            },
            size,
            size,
        );
        let points = ellipse(&plane, num_points);
        Self {
            plane,
            points,
            id,
            sample_size,
        }
    }

    fn bench_rasterize<M: Measurement>(
        &self,
        group: &mut BenchmarkGroup<M>,
        config: RasterizeConfig,
        variant: &str,
    ) {
        let rasterizer = Rasterizer::new(config);
        group
            .sample_size(self.sample_size)
            .throughput(Throughput::Elements(self.points.len() as u64))
            .bench_with_input(
                BenchmarkId::new(format!("{}-{}", self.id, variant), self.points.len()),
                &self.points,
                |b, input| {
                    b.iter(|| {
                        rasterizer
                            .rasterize(&self.plane, black_box(input), PointSpace::Physical)
                            .map(|r| r.foreground_count())
                    })
                },
            );
    }
}

fn main() {
    let mut c = Criterion::default().configure_from_args();
    let mut group = c.benchmark_group("rasterize");
    for def in [
        BenchDef::new("512-sparse", 100, 512, 64),
        BenchDef::new("512-dense", 100, 512, 4096),
        BenchDef::new("2048-sparse", 20, 2048, 256),
    ] {
        def.bench_rasterize(&mut group, RasterizeConfig::default(), "repaired");
        def.bench_rasterize(&mut group, RasterizeConfig::simple(), "simple");
    }
    group.finish();
}
