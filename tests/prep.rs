mod common;

use std::collections::BTreeMap;

use common::{SEED, open_additive, open_spdz, run_parties};
use polyprep::{
    beaver::Beaver,
    config::{DabitMethod, EdabitMethod, PrepConfig},
    data_types::AuthBit,
    domain::{Gf2, Mersenne61, ShareDomain, Z64},
    error::PrepError,
    generator::{Fault, InsecureDealer},
    items::{EdaBit, InputTuple, Kind, Triple},
    open::Opener,
    prep::BufferPrep,
    share::{Additive, Malicious, SemiHonest, Share, Spdz},
};

type RingPrep = BufferPrep<
    SemiHonest<Z64>,
    InsecureDealer<Additive<Z64>>,
    InsecureDealer<Additive<Gf2>>,
>;

type FieldPrep =
    BufferPrep<Malicious<Mersenne61>, InsecureDealer<Spdz<Mersenne61>>, InsecureDealer<AuthBit>>;

fn small_config() -> PrepConfig {
    PrepConfig {
        buffer_size: 8,
        bucket_size: 3,
        canaries: 3,
        ..PrepConfig::default()
    }
}

fn ring_prep(
    id: usize,
    parties: usize,
    config: &PrepConfig,
    fault: Option<Fault>,
) -> Result<RingPrep, PrepError> {
    let mut arith = InsecureDealer::new(SEED, id, parties, 16)?;
    if let Some(fault) = fault {
        arith = arith.with_fault(fault);
    }
    let binary = InsecureDealer::new(SEED, id, parties, 64)?;
    BufferPrep::new(config.clone(), arith, binary)
}

fn field_prep(id: usize, parties: usize, config: &PrepConfig) -> Result<FieldPrep, PrepError> {
    let arith = InsecureDealer::new(SEED, id, parties, 16)?;
    let binary = InsecureDealer::new(SEED, id, parties, 64)?;
    BufferPrep::new(config.clone(), arith, binary)
}

type A = Additive<Z64>;

struct Handed {
    triple: Triple<A>,
    square: (A, A),
    inverse: (A, A),
    bit: A,
    input: InputTuple<A>,
    wrong_kind: String,
    usage: BTreeMap<Kind, usize>,
}

#[tokio::test]
async fn semi_honest_items_are_consistent() -> Result<(), PrepError> {
    // large enough that a batch of triples has an invertible product
    let config = PrepConfig {
        buffer_size: 64,
        ..small_config()
    };
    let handed = run_parties(3, &config, async |ctx| {
        let mut prep = ring_prep(ctx.id(), ctx.parties(), &config, None)?;
        assert_eq!(prep.strategy().dabits, DabitMethod::Raw);
        let triple = prep.get_three(&ctx, Kind::Triple).await?;
        let square = prep.get_two(&ctx, Kind::Square).await?;
        let inverse = prep.get_two(&ctx, Kind::Inverse).await?;
        let bit = prep.get_one(&ctx, Kind::Bit).await?;
        let input = prep.get_input(&ctx, 1).await?;
        let wrong_kind = match prep.get_one(&ctx, Kind::Triple).await {
            Err(PrepError::Configuration(msg)) => msg,
            other => panic!("expected a configuration error, got {other:?}"),
        };
        Ok(Handed {
            triple,
            square,
            inverse,
            bit,
            input,
            wrong_kind,
            usage: prep.usage(),
        })
    })
    .await?;

    let open = |f: fn(&Handed) -> A| open_additive(handed.iter().map(f));
    let (a, b, c) = (
        open(|h| h.triple.a),
        open(|h| h.triple.b),
        open(|h| h.triple.c),
    );
    assert_eq!(c, a * b);
    let (x, x2) = (open(|h| h.square.0), open(|h| h.square.1));
    assert_eq!(x2, x * x);
    let (y, y_inv) = (open(|h| h.inverse.0), open(|h| h.inverse.1));
    assert_eq!(y * y_inv, Z64::one());
    let bit = open(|h| h.bit);
    assert!(bit == Z64(0) || bit == Z64(1));

    let mask = open(|h| h.input.share);
    for (id, h) in handed.iter().enumerate() {
        if id == 1 {
            assert_eq!(h.input.value, Some(mask));
        } else {
            assert_eq!(h.input.value, None);
        }
        assert_eq!(h.wrong_kind, "no triples");
        // one handed out plus a whole buffer used up to derive the inverses
        assert_eq!(h.usage.get(&Kind::Triple), Some(&65));
        assert_eq!(h.usage.get(&Kind::Square), Some(&1));
        assert_eq!(h.usage.get(&Kind::Inverse), Some(&1));
        assert_eq!(h.usage.get(&Kind::Input), Some(&1));
    }
    Ok(())
}

#[tokio::test]
async fn beaver_multiplies_seven_by_six() -> Result<(), PrepError> {
    let config = small_config();
    let products = run_parties(2, &config, async |ctx| {
        let mut prep = ring_prep(ctx.id(), ctx.parties(), &config, None)?;
        // 7 = 100 + (7 - 100), 6 = 6 + 0
        let (x, y) = if ctx.id() == 0 {
            (Additive(Z64(100)), Additive(Z64(6)))
        } else {
            (Additive(Z64(7u64.wrapping_sub(100))), Additive(Z64(0)))
        };
        let z = prep.arith().multiply(&ctx, &[(x, y)]).await?;
        let opened = prep.arith().opener().open(&ctx, &z).await?;
        Ok(opened[0])
    })
    .await?;
    assert_eq!(products, vec![Z64(42), Z64(42)]);
    Ok(())
}

#[tokio::test]
async fn malicious_products_pass_the_mac_check() -> Result<(), PrepError> {
    let config = small_config();
    let opened = run_parties(3, &config, async |ctx| {
        let mut prep = field_prep(ctx.id(), ctx.parties(), &config)?;
        assert!(prep.strategy().certify);
        let role = prep.arith().role().clone();
        let c = |v: u64| Spdz::constant(Mersenne61::from_u64(v), &role);
        let pairs = [(c(7), c(6)), (c(123456789), c(987654321))];

        // a separate opener for the products, the pool serves as the triple source
        let mut opener = <Spdz<Mersenne61> as Share>::Opener::new(&role);
        let mut beaver = Beaver::new(role.clone());
        let products = beaver
            .multiply(&ctx, &mut opener, prep.arith(), &pairs)
            .await?;
        let opened = opener.open(&ctx, &products).await?;
        opener.check(&ctx).await?;

        let bit_role = prep.binary().role().clone();
        let b = |v: bool| AuthBit::constant(Gf2(v), &bit_role);
        let ands = prep
            .binary()
            .multiply(&ctx, &[(b(true), b(true)), (b(true), b(false))])
            .await?;
        let ands = prep.binary().opener().open(&ctx, &ands).await?;
        Ok((opened, ands))
    })
    .await?;
    let expected = Mersenne61::from_u64(123456789) * Mersenne61::from_u64(987654321);
    for (products, ands) in opened {
        assert_eq!(products, vec![Mersenne61::from_u64(42), expected]);
        assert_eq!(ands, vec![Gf2(true), Gf2(false)]);
    }
    Ok(())
}

#[tokio::test]
async fn malicious_items_are_certified() -> Result<(), PrepError> {
    let config = small_config();
    let handed = run_parties(2, &config, async |ctx| {
        let mut prep = field_prep(ctx.id(), ctx.parties(), &config)?;
        assert_eq!(prep.strategy().dabits, DabitMethod::Shuffle);
        assert_eq!(prep.strategy().edabits, EdabitMethod::Unsupported);
        let triple = prep.get_three(&ctx, Kind::Triple).await?;
        let square = prep.get_two(&ctx, Kind::Square).await?;
        let bit = prep.get_one(&ctx, Kind::Bit).await?;
        let dabit = prep.get_dabit(&ctx).await?;
        let edabits = match prep.get_edabits(&ctx, false, 8, 1).await {
            Err(PrepError::Configuration(msg)) => msg,
            other => panic!("expected a configuration error, got {other:?}"),
        };
        Ok((triple, square, bit, dabit, edabits))
    })
    .await?;

    let a = open_spdz(handed.iter().map(|h| h.0.a));
    let b = open_spdz(handed.iter().map(|h| h.0.b));
    let c = open_spdz(handed.iter().map(|h| h.0.c));
    assert_eq!(c, a * b);
    let x = open_spdz(handed.iter().map(|h| h.1.0));
    let x2 = open_spdz(handed.iter().map(|h| h.1.1));
    assert_eq!(x2, x * x);
    let bit = open_spdz(handed.iter().map(|h| h.2));
    assert!(bit.is_zero() || bit == Mersenne61::one());
    let arith = open_spdz(handed.iter().map(|h| h.3.arith));
    let binary = handed.iter().fold(false, |acc, h| acc ^ h.3.bit.bit());
    assert_eq!(arith, Mersenne61::from_u64(binary as u64));
    assert!(handed.iter().all(|h| h.4 == "no edabits"));
    Ok(())
}

#[tokio::test]
async fn corrupted_generator_aborts_certified_preprocessing() {
    let config = PrepConfig {
        certify: Some(true),
        ..small_config()
    };
    let fault = Fault {
        kind: Kind::Triple,
        index: 4,
        offset: 1,
    };
    let result = run_parties(2, &config, async |ctx| {
        let mut prep = ring_prep(ctx.id(), ctx.parties(), &config, Some(fault))?;
        prep.get_three(&ctx, Kind::Triple).await
    })
    .await;
    assert!(matches!(result, Err(PrepError::SacrificeCheckFailed(_))));
}

type RingEdabit = EdaBit<Additive<Z64>, Additive<Gf2>>;

fn compose(edabits: &[Vec<RingEdabit>], e: usize) -> (u64, u64) {
    let sum = open_additive(edabits.iter().map(|p| p[e].sum)).0;
    let n_bits = edabits[0][e].bits.len();
    let bits = (0..n_bits).fold(0u64, |acc, i| {
        let bit = open_additive(edabits.iter().map(|p| p[e].bits[i]));
        acc | ((bit.0 as u64) << i)
    });
    (sum, bits)
}

async fn ring_edabits(
    strict: bool,
    count: usize,
    fault: Option<Fault>,
) -> Result<Vec<Vec<RingEdabit>>, PrepError> {
    let config = PrepConfig {
        buffer_size: 4,
        ..small_config()
    };
    certified_ring_edabits(config, strict, count, fault).await
}

async fn certified_ring_edabits(
    config: PrepConfig,
    strict: bool,
    count: usize,
    fault: Option<Fault>,
) -> Result<Vec<Vec<RingEdabit>>, PrepError> {
    let config = PrepConfig {
        certify: Some(true),
        ..config
    };
    run_parties(2, &config, async |ctx| {
        let mut prep = ring_prep(ctx.id(), ctx.parties(), &config, fault)?;
        assert_eq!(prep.strategy().dabits, DabitMethod::Direct);
        assert_eq!(prep.strategy().edabits, EdabitMethod::Shuffle);
        let edabits = prep.get_edabits(&ctx, strict, 8, count).await?;
        assert_eq!(prep.usage().get(&Kind::EdaBit), Some(&count));
        Ok(edabits)
    })
    .await
}

#[tokio::test]
async fn loose_edabits_match_their_bits_modulo_the_bit_length() -> Result<(), PrepError> {
    // more than one buffer, to refill the pool in between
    let edabits = ring_edabits(false, 5, None).await?;
    for e in 0..5 {
        let (sum, bits) = compose(&edabits, e);
        assert_eq!(sum & 0xff, bits);
        assert_eq!(edabits[0][e].bits.len(), 8);
    }
    Ok(())
}

#[tokio::test]
async fn strict_edabits_are_sanitized() -> Result<(), PrepError> {
    // an error of 2^8 is invisible to the bucket check of 8-bit edabits
    let high_error = Fault {
        kind: Kind::EdaBit,
        index: 0,
        offset: 1 << 8,
    };
    let edabits = ring_edabits(true, 4, Some(high_error)).await?;
    for e in 0..4 {
        let (sum, bits) = compose(&edabits, e);
        assert_eq!(sum, bits);
    }
    Ok(())
}

#[tokio::test]
async fn large_edabit_batches_are_certified_on_worker_threads() -> Result<(), PrepError> {
    let config = PrepConfig {
        buffer_size: 600,
        threads: 4,
        ..small_config()
    };
    let edabits = certified_ring_edabits(config, true, 600, None).await?;
    for e in 0..600 {
        let (sum, bits) = compose(&edabits, e);
        assert_eq!(sum, bits);
    }
    Ok(())
}

#[tokio::test]
async fn corrupted_edabits_are_rejected() {
    for index in [0, 6, 14] {
        let low_error = Fault {
            kind: Kind::EdaBit,
            index,
            offset: 1,
        };
        let result = ring_edabits(false, 1, Some(low_error)).await;
        assert!(matches!(result, Err(PrepError::SacrificeCheckFailed(_))));
    }
}

#[tokio::test]
async fn ring_dabits_use_the_direct_sacrifice() -> Result<(), PrepError> {
    let config = PrepConfig {
        certify: Some(true),
        ..small_config()
    };
    let dabits = run_parties(3, &config, async |ctx| {
        let mut prep = ring_prep(ctx.id(), ctx.parties(), &config, None)?;
        let mut dabits = vec![];
        for _ in 0..10 {
            dabits.push(prep.get_dabit(&ctx).await?);
        }
        Ok(dabits)
    })
    .await?;
    for d in 0..10 {
        let arith = open_additive(dabits.iter().map(|p| p[d].arith));
        let bit = open_additive(dabits.iter().map(|p| p[d].bit));
        assert_eq!(arith, Z64(bit.0 as u64));
    }
    Ok(())
}

#[tokio::test]
async fn semi_honest_strict_edabits_are_sanitized() -> Result<(), PrepError> {
    let config = PrepConfig {
        buffer_size: 4,
        ..small_config()
    };
    // an honest generator may hand out loose edabits even if strict ones are requested
    let loose = Fault {
        kind: Kind::EdaBit,
        index: 0,
        offset: 1 << 8,
    };
    let edabits = run_parties(2, &config, async |ctx| {
        let mut prep = ring_prep(ctx.id(), ctx.parties(), &config, Some(loose))?;
        assert_eq!(prep.strategy().edabits, EdabitMethod::Raw);
        let edabits = prep.get_edabits(&ctx, true, 8, 4).await?;
        assert_eq!(prep.usage().get(&Kind::DaBit), Some(&32));
        Ok(edabits)
    })
    .await?;
    for e in 0..4 {
        let (sum, bits) = compose(&edabits, e);
        assert_eq!(sum, bits);
    }
    Ok(())
}
