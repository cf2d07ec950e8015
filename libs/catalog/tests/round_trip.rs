//! Catalog round-trip fuzz: load(serialize(catalog)) == catalog
//!
//! Catalogs are generated from a seeded pseudo-random schedule so failures
//! reproduce exactly.

use metalforge_catalog::{
    BootConfig, Catalog, CatalogDocument, DeviceTypeEntry, FirmwareTracking, HardwareSpec,
    MethodDescriptor, MotherboardEntry, VendorEntry,
};

struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

const VENDORS: &[(&str, &str)] = &[
    ("supermicro", "Supermicro"),
    ("hpe", "HPE"),
    ("dell", "Dell"),
    ("lenovo", "Lenovo"),
];

const COMPONENTS: &[&str] = &["bmc", "bios", "nic", "raid"];

fn random_document(rng: &mut Rng, case: usize) -> CatalogDocument {
    let mut document = CatalogDocument::default();
    let vendor_count = 1 + rng.below(VENDORS.len() as u64) as usize;

    for (vendor_id, display_name) in VENDORS.iter().take(vendor_count) {
        let mut vendor = VendorEntry {
            display_name: (*display_name).to_string(),
            ..Default::default()
        };

        if rng.below(2) == 0 {
            vendor.firmware_defaults.insert(
                COMPONENTS[rng.below(COMPONENTS.len() as u64) as usize].to_string(),
                MethodDescriptor {
                    method: "redfish_multipart".to_string(),
                    artifact: None,
                    version: None,
                },
            );
        }

        let board_count = 1 + rng.below(3) as usize;
        for board_index in 0..board_count {
            let model = format!("Board-{case}-{board_index}");
            let mut board = MotherboardEntry::default();

            if rng.below(2) == 0 {
                board.firmware.insert(
                    COMPONENTS[rng.below(COMPONENTS.len() as u64) as usize].to_string(),
                    FirmwareTracking {
                        latest_version: format!("{}.{}", rng.below(9), rng.below(99)),
                        method: "vendor_tool".to_string(),
                        artifact: format!("{vendor_id}/fw-{board_index}.bin"),
                    },
                );
            }

            let type_count = 1 + rng.below(3) as usize;
            for type_index in 0..type_count {
                // Ids embed vendor and board to stay globally unique.
                let id = format!("{vendor_id}.{case}-{board_index}.t{type_index}");
                board.device_types.insert(
                    id,
                    DeviceTypeEntry {
                        description: format!("generated node {case}/{board_index}/{type_index}"),
                        hardware_spec: HardwareSpec {
                            cpu_model: (rng.below(2) == 0)
                                .then(|| format!("Xeon {}", 4000 + rng.below(5000))),
                            cpu_cores: (rng.below(2) == 0).then(|| 8 + rng.below(56) as u32),
                            memory_gib: (rng.below(2) == 0).then(|| 64 * (1 + rng.below(8) as u32)),
                            storage: None,
                            network: None,
                        },
                        boot_config: BootConfig {
                            boot_order: if rng.below(2) == 0 {
                                vec!["pxe".to_string(), "disk".to_string()]
                            } else {
                                Vec::new()
                            },
                            boot_mode: (rng.below(2) == 0).then(|| "uefi".to_string()),
                        },
                        bios_template: None,
                        preserve_settings: None,
                    },
                );
            }

            vendor.motherboards.insert(model, board);
        }

        document.vendors.insert((*vendor_id).to_string(), vendor);
    }

    document
}

#[test]
fn fuzz_round_trip_equality() {
    let mut rng = Rng(0xc0ff_ee00_d00d_5eed);

    for case in 0..32 {
        let document = random_document(&mut rng, case);
        let catalog = Catalog::from_document(document).expect("generated catalog must load");

        let serialized = catalog.serialize().unwrap();
        let reloaded = Catalog::load(&serialized).unwrap();

        assert_eq!(reloaded, catalog, "case {case} failed round-trip");
    }
}

#[test]
fn fuzz_listing_is_stable() {
    let mut rng = Rng(0x1234_5678_9abc_def0);
    let document = random_document(&mut rng, 99);
    let catalog = Catalog::from_document(document).unwrap();

    let first: Vec<String> = catalog
        .list_device_types()
        .into_iter()
        .map(|dt| dt.id)
        .collect();
    for _ in 0..5 {
        let again: Vec<String> = catalog
            .list_device_types()
            .into_iter()
            .map(|dt| dt.id)
            .collect();
        assert_eq!(again, first);
    }

    let mut sorted = first.clone();
    sorted.sort();
    assert_eq!(first, sorted, "listing must be ordered by id");
}
