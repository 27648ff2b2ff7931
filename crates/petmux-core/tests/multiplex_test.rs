use std::collections::BTreeSet;

use burn_ndarray::NdArray;
use petmux_core::multiplex::{compose, Channel, ChannelAssignment};
use petmux_core::{CoreError, Image, ImageGeometry};
use proptest::prelude::*;

type Backend = NdArray<f32>;

fn ramp(len: usize, scale: f32) -> Image<Backend> {
    let geometry = ImageGeometry::with_size([len, 1, 1]);
    let voxels = (0..len).map(|v| v as f32 * scale).collect();
    Image::from_voxels(voxels, geometry, &Default::default()).unwrap()
}

proptest! {
    #[test]
    fn test_valid_assignments_are_bijections(
        order in Just(Channel::ALL.to_vec()).prop_shuffle(),
        count in 1usize..=3,
    ) {
        let entries: Vec<(String, Channel)> = order
            .iter()
            .take(count)
            .enumerate()
            .map(|(i, &channel)| (format!("tracer{i}"), channel))
            .collect();

        let assignment = ChannelAssignment::new(entries.clone()).unwrap();
        let channels: BTreeSet<Channel> = assignment.entries().iter().map(|(_, c)| *c).collect();
        prop_assert_eq!(channels.len(), count);
        for (tracer, channel) in &entries {
            prop_assert_eq!(assignment.channel_of(tracer), Some(*channel));
            prop_assert_eq!(assignment.tracer_on(*channel), Some(tracer.as_str()));
        }
    }

    #[test]
    fn test_reused_channel_is_rejected(channel in prop::sample::select(Channel::ALL.to_vec())) {
        let entries = vec![("a".to_string(), channel), ("b".to_string(), channel)];
        prop_assert!(matches!(
            ChannelAssignment::new(entries),
            Err(CoreError::DuplicateChannel(c)) if c == channel
        ));
    }
}

#[test]
fn test_each_volume_is_normalised_independently() {
    let volumes = vec![ramp(3, 1.0), ramp(3, 1000.0), ramp(3, 0.25)];
    let assignment = ChannelAssignment::sequential(&["FDG", "PSMA", "FAPI"]).unwrap();
    let composite = compose(&volumes, &assignment).unwrap();

    let rgb = composite.to_rgb_voxels().unwrap();
    assert_eq!(rgb, vec![[0, 0, 0], [128, 128, 128], [255, 255, 255]]);
}
