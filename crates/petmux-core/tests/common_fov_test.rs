use burn_ndarray::NdArray;
use petmux_core::mask::{BoundingBox, CommonFovBuilder};
use petmux_core::spatial::{Direction3, Point3, Spacing3};
use petmux_core::{CoreError, Image, ImageGeometry};
use proptest::prelude::*;

type Backend = NdArray<f32>;

fn box_mask(geometry: ImageGeometry, bbox: BoundingBox) -> Image<Backend> {
    bbox.to_mask::<Backend>(geometry, &Default::default()).unwrap()
}

#[test]
fn test_common_fov_across_scanner_frames() {
    let reference_geometry = ImageGeometry::with_size([13, 13, 13]);
    // Same grid shape, origin from a different scanner session.
    let moving_geometry = ImageGeometry::new(
        [13, 13, 13],
        Point3::new(-250.0, 40.0, 812.5),
        Spacing3::new(1.0, 1.0, 1.0),
        Direction3::identity(),
    );

    let reference = box_mask(reference_geometry, BoundingBox::new([0, 0, 0], [10, 10, 10]));
    let second = box_mask(moving_geometry, BoundingBox::new([2, 0, 0], [12, 10, 10]));
    let third = box_mask(moving_geometry, BoundingBox::new([0, 1, 0], [10, 9, 10]));

    let mut builder = CommonFovBuilder::new(reference).unwrap();
    builder.add(&second).unwrap();
    builder.add(&third).unwrap();
    assert_eq!(*builder.bounding_box(), BoundingBox::new([2, 1, 0], [10, 9, 10]));

    let fov = builder.build().unwrap();
    assert!(fov.geometry().approx_eq(&reference_geometry, 1e-9));

    // Back in the moving frame the same voxels are kept.
    let clipped = builder.apply(&third).unwrap();
    assert_eq!(
        BoundingBox::from_mask(&clipped).unwrap(),
        BoundingBox::new([2, 1, 0], [10, 9, 10])
    );
}

#[test]
fn test_empty_moving_mask_is_reported() {
    let geometry = ImageGeometry::with_size([4, 4, 4]);
    let reference = box_mask(geometry, BoundingBox::new([0, 0, 0], [3, 3, 3]));
    let empty = Image::<Backend>::zeros(geometry, &Default::default());

    let mut builder = CommonFovBuilder::new(reference).unwrap();
    assert!(matches!(builder.add(&empty), Err(CoreError::EmptyMask(_))));
}

fn arb_box(n: usize) -> impl Strategy<Value = BoundingBox> {
    prop::array::uniform3(0..n).prop_flat_map(move |min| {
        let ranges = [min[0]..n, min[1]..n, min[2]..n];
        ranges.prop_map(move |max| BoundingBox::new(min, max))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_common_fov_shrinks_monotonically(
        first in arb_box(8),
        others in prop::collection::vec(arb_box(8), 1..4),
    ) {
        let geometry = ImageGeometry::with_size([8, 8, 8]);
        let mut builder = CommonFovBuilder::new(box_mask(geometry, first)).unwrap();
        let mut previous = *builder.bounding_box();

        for bbox in others {
            match builder.add(&box_mask(geometry, bbox)) {
                Ok(current) => {
                    for axis in 0..3 {
                        prop_assert!(current.min[axis] >= previous.min[axis]);
                        prop_assert!(current.max[axis] <= previous.max[axis]);
                        prop_assert!(current.min[axis] >= bbox.min[axis]);
                        prop_assert!(current.max[axis] <= bbox.max[axis]);
                    }
                    previous = *current;
                }
                Err(err) => {
                    prop_assert!(
                        matches!(err, CoreError::EmptyIntersection { .. }),
                        "unexpected error: {err}"
                    );
                    prop_assert!(previous.intersect(&bbox).is_none());
                    break;
                }
            }
        }
    }
}
